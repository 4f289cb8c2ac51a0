use natproxy::config::FileServerConfig;
use natproxy::fileserver::FileServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    natproxy::logging::init();

    let cfg = FileServerConfig::load();
    let server = FileServer::bind(&cfg).await?;

    tokio::select! {
        res = server.run() => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
