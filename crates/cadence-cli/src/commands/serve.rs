//! Serve command

use std::path::Path;

use anyhow::Result;

use super::open_db;

pub async fn cmd_serve(db_path: &Path, host: &str, port: u16, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    println!("🚀 Starting Cadence API server...");
    if no_encrypt {
        println!("   ⚠️  Database encryption disabled");
    }
    println!("   Listening on http://{}:{}", host, port);

    cadence_server::serve(db, host, port).await
}
