use anyhow::{Context, Result};

use proctordesk_lib::config::AppConfig;
use proctordesk_lib::database::{load_question_set, DatabaseManager, RestBackend};
use proctordesk_lib::profile::ProfileStore;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    println!("🔧 Checking ProctorDesk backend...");

    let config = AppConfig::load().context("Failed to load configuration")?;

    println!("📊 Configuration:");
    let db = &config.database;
    println!("  database: {}@{}:{}/{}", db.user, db.host, db.port, db.name);
    println!("  DB password: {}", if config.database.password.is_empty() { "<empty>" } else { "***set***" });
    println!("  REST backend: {}", config.backend.rest_url.as_deref().unwrap_or("<not set>"));
    println!("  face service: {}", config.backend.face_service_url.as_deref().unwrap_or("<not set>"));

    let data_dir = config.storage.resolve_data_dir();
    let profile = ProfileStore::new(&data_dir).load()?;
    println!(
        "  local profile: {} (reference enrolled: {}, subcategories: {:?})",
        data_dir.display(),
        profile.has_reference(),
        profile.subcategories
    );

    if let Some(url) = &config.backend.rest_url {
        println!("\n🌐 Querying REST backend...");
        let backend = RestBackend::new(url, config.backend.api_key.clone())?;
        let discipline = std::env::args().nth(1).unwrap_or_else(|| "general".to_string());
        let questions = load_question_set(&backend, &discipline, &profile.subcategories).await?;
        println!("✅ {} usable question(s) for discipline '{}'", questions.len(), discipline);
        return Ok(());
    }

    println!("\n🔗 Connecting to PostgreSQL...");
    let db = match DatabaseManager::new(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            println!("❌ Connection failed: {}", e);
            return Err(e.into());
        }
    };
    println!("✅ PostgreSQL connection successful");

    println!("🔍 Counting questions per discipline...");
    let counts = db.count_questions_by_discipline().await?;
    if counts.is_empty() {
        println!("⚠️  The question bank is empty");
    }
    for count in counts {
        println!("  {:<24} {}", count.discipline, count.questions);
    }

    if let Some(discipline) = std::env::args().nth(1) {
        let questions = load_question_set(&db, &discipline, &profile.subcategories).await?;
        println!("✅ {} usable question(s) for discipline '{}'", questions.len(), discipline);
    }

    println!("\n🎉 Backend check completed");
    Ok(())
}
