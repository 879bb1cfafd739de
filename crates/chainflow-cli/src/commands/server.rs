//! `chainflow server` — Start the Chainflow HTTP server.

pub async fn run(host: String, port: u16, db_path: String) -> Result<(), String> {
    let config = chainflow_server::ServerConfig {
        host: host.clone(),
        port,
        db_path,
    };

    println!("Starting Chainflow server on {}:{}...", host, port);

    let addr = chainflow_server::start_server(config).await?;
    println!("Chainflow server listening on http://{}", addr);

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    Ok(())
}
