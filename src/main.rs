use dotenvy::dotenv;
use snafu::ResultExt as _;
use tokio::sync::mpsc;

use talon::error::{ApplicationError, ConsoleSnafu};
use talon::repl::{self, Repl};
use talon::store::Store;
use talon::tracker::Watcher;
use talon::{config, discord, htb, logger};

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    dotenv().ok();

    let config = config::load()?;

    let _guard = logger::init(&config)?;

    let store = Store::new(config.store_path.clone());
    let roster = store.load();

    let htb = htb::connect(&config.htb)?;
    let channel = discord::connect(&config.discord)?;

    let watcher = Watcher::new(roster, store, htb, channel, &config);
    let (commands, inbox) = mpsc::channel(16);
    let handle = tokio::spawn(watcher.run(inbox));

    let console = Repl::new().context(ConsoleSnafu)?;
    repl::start(console, commands).await.context(ConsoleSnafu)?;

    // the console hung up its sender, the watcher drains and stops
    let _ = handle.await;

    Ok(())
}
