use std::sync::Arc;

use habito_core::{config::Config, store::HabitStore};
use habito_store::JsonFileStore;

#[tokio::main]
async fn main() -> Result<(), habito_core::Error> {
    habito_core::logging::init("habito")?;

    let cfg = Arc::new(Config::load()?);

    let storage = Arc::new(JsonFileStore::open(&cfg.habits_file)?);
    let store = Arc::new(HabitStore::open(storage).await?);

    habito_telegram::router::run_polling(cfg, store)
        .await
        .map_err(|e| habito_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
