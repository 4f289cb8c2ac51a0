use natproxy::config::Config;
use natproxy::server::Listener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    natproxy::logging::init();

    let cfg = Config::load()?;
    let listener = Listener::bind(&cfg).await?;

    tokio::select! {
        res = listener.run() => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
