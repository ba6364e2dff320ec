use company_analysis_agent::{create_orchestrator, AgentConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AgentConfig::from_env()?;
    let orchestrator = create_orchestrator(&config)?;

    info!("Company Analysis Agent starting");

    println!("\n=== COMPANY ANALYSIS AGENT ===");
    println!("Supported companies:");
    for subject in orchestrator.catalog().subjects() {
        println!("  - {} ({})", subject.name, subject.code);
    }
    println!("\nAsk a question about one of them, or type 'quit' to exit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("quit") {
            break;
        }

        match orchestrator.run(query).await {
            Ok(outcome) => {
                println!("\n=== ANALYSIS RESULT ===");
                println!("Subject: {} ({})", outcome.subject.name, outcome.subject.code);
                println!("Outcome: {:?}", outcome.kind);
                println!("Execution verified: {}", outcome.execution_verified);
                println!("Iterations: {}", outcome.iterations);
                if let Some(audit_id) = outcome.audit_id {
                    println!("Audit ID: {}", audit_id);
                }
                println!("\n{}\n", outcome.answer);
            }
            Err(e) => eprintln!("Analysis failed: {}", e),
        }
    }

    orchestrator.shutdown().await?;
    info!("Company Analysis Agent stopped");

    Ok(())
}
