//! Recall demo
//!
//! Simulates a conversation across 1000+ turns: seeds preferences in the
//! early turns, burns through hundreds of casual exchanges, then probes
//! whether turn-1 facts still surface at the end.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use anyhow::Result;
use recall::session::{MemorySession, PromptStyle, SessionConfig};

#[derive(Parser)]
#[command(name = "recall-demo")]
#[command(about = "Long-form conversational memory demo")]
#[command(version)]
struct Cli {
    /// Database path
    #[arg(long, env = "RECALL_DB_PATH", default_value = "recall_demo.db")]
    db_path: String,

    /// Total conversation turns to simulate
    #[arg(long, default_value = "1000")]
    turns: usize,

    /// Where to write the JSON export (- to skip)
    #[arg(long, default_value = "recall_demo_memories.json")]
    export: String,
}

const SEED_TURNS: &[(&str, &str)] = &[
    (
        "My name is Rajesh and I prefer to communicate in Kannada.",
        "Namaste Rajesh! I'll remember your language preference.",
    ),
    (
        "I work at TCS in Bangalore as a software engineer.",
        "Great! I've noted that you work at TCS in Bangalore.",
    ),
    (
        "Please always call me after 11 am, I'm not available in the mornings.",
        "Understood, I'll only suggest calls after 11 AM.",
    ),
    (
        "I'm allergic to peanuts, so never recommend restaurants that serve them.",
        "Important! I've noted your peanut allergy.",
    ),
    (
        "My mother's birthday is on march 15.",
        "I've saved that date.",
    ),
    (
        "I have a meeting with the client every friday at 3 pm.",
        "Recorded your recurring Friday client meeting.",
    ),
];

const CASUAL_TURNS: &[&str] = &[
    "How's the weather today?",
    "What's the latest news?",
    "Tell me a joke",
    "What day is it?",
    "How are you?",
    "What can you help me with?",
    "That's interesting",
    "Thanks for the help",
    "Can you explain that again?",
    "I see",
];

fn banner(title: &str) {
    println!("\n{}", "=".repeat(78));
    println!("  {}", title);
    println!("{}\n", "=".repeat(78));
}

fn print_memories(memories: &[recall::Memory]) {
    if memories.is_empty() {
        println!("  (no memories retrieved)");
        return;
    }
    for (i, m) in memories.iter().enumerate() {
        println!("  {}. [{}] {}: {}", i + 1, m.memory_type, m.key, m.value);
        println!("     turn {}, confidence {:.2}", m.source_turn, m.confidence);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_path = shellexpand::tilde(&cli.db_path).to_string();

    banner("Recall: long-form memory demo");
    println!("Database: {}", db_path);

    let mut session = MemorySession::open(SessionConfig {
        db_path,
        ..SessionConfig::default()
    })?;

    banner("Phase 1: seeding preferences and facts");
    for &(user, reply) in SEED_TURNS {
        let outcome = session.process_turn(user, Some(reply));
        println!("Turn {}: {}", outcome.turn_index, user);
        for m in &outcome.extracted {
            println!("  + [{}] {}: {}", m.memory_type, m.key, m.value);
        }
    }

    banner("Phase 2: casual filler turns");
    let target = cli.turns.max(SEED_TURNS.len() + 1);
    while (session.current_turn() as usize) < target {
        let text = CASUAL_TURNS[session.current_turn() as usize % CASUAL_TURNS.len()];
        session.process_turn(text, Some("Sure, I'm here to help!"));

        if session.current_turn() % 200 == 0 {
            let stats = session.stats();
            println!(
                "  turn {}: {} memories stored, avg retrieval {:.2} ms",
                stats.current_turn, stats.total_memories, stats.avg_retrieval_time_ms
            );
        }
    }

    banner("Phase 3: recall probes after the long gap");
    for query in [
        "What language do I speak?",
        "When should you call me?",
        "What are my dietary restrictions?",
        "What about my friday schedule?",
    ] {
        println!("Query: {}", query);
        let memories = session.retrieve_memories(query, None, 0.5);
        print_memories(&memories);
        println!();
    }

    let recalled = session.retrieve_memories("what language should we use for the call", None, 0.5);
    println!("Prompt injection preview:");
    println!(
        "{}",
        MemorySession::format_for_prompt(&recalled, PromptStyle::Natural)
    );

    banner("Phase 4: statistics");
    let stats = session.stats();
    println!("Current turn:        {}", stats.current_turn);
    println!("Total memories:      {}", stats.total_memories);
    println!("Average confidence:  {:.3}", stats.average_confidence);
    for (memory_type, count) in &stats.memories_by_type {
        println!("  {:<12} {}", memory_type, count);
    }
    println!("Avg extraction time: {:.2} ms", stats.avg_extraction_time_ms);
    println!("Avg retrieval time:  {:.2} ms", stats.avg_retrieval_time_ms);

    if cli.export != "-" {
        let export_path = shellexpand::tilde(&cli.export).to_string();
        if session.export(&export_path) {
            println!("\nMemories exported to {}", export_path);
        }
    }

    session.close();
    Ok(())
}
