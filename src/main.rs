//! Sprout - 交互式对话
//!
//! 入口：初始化日志、装配运行时，在标准输入上跑对话循环（exit / quit 退出）。

use anyhow::Context;
use sprout::config::load_config;
use sprout::core::AgentRuntime;
use sprout::observability;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let runtime = AgentRuntime::builder(cfg)
        .build()
        .await
        .context("Failed to create agent")?;
    let mut session = runtime.new_session().await;

    let mode = if session.binding().controller_mode {
        "controller (code evolution on)"
    } else {
        "standard"
    };
    match runtime.model() {
        Some(choice) => println!(
            "Booted with provider={} model={} fallback={} [{}]",
            choice.provider, choice.model, choice.used_fallback, mode
        ),
        None => println!("Booted [{}]", mode),
    }
    for warning in &session.binding().warnings {
        println!("(warning) {}", warning.message);
    }
    println!("Personal Assistant ready. Type 'exit' to quit.\n");

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
            println!("Assistant: Bye!");
            break;
        }
        if input.is_empty() {
            continue;
        }

        match session.run_turn(input).await {
            Ok(outcome) => {
                println!("Assistant: {}\n", outcome.response);
                if outcome.rebuilt {
                    println!("[Controller] New capability added. Rebuilding agent...\n");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                println!("Assistant: (error) {}\n", e);
            }
        }
    }

    Ok(())
}
