use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fop::{records::RecordCache, roster::Roster};
use shared::{
    domain::{AthleteId, GroupId, LiftKind},
    protocol::AthleteSummary,
};
use storage::{AthleteRepository, MemoryStorage};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "./fixtures/demo_competition.json")]
    competition: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the lifting order of a group.
    Order { group: i64 },
    /// Numbers the athletes of a group and saves the competition file.
    StartNumbers {
        group: i64,
        #[arg(long)]
        dry_run: bool,
    },
    /// Prints the record boxes of a group as JSON.
    Records {
        group: i64,
        #[arg(long)]
        athlete: Option<i64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = MemoryStorage::from_json_file(&cli.competition)?;

    match cli.command {
        Command::Order { group } => {
            let roster = Roster::load(storage.load_group(GroupId(group))?);
            let summaries = roster.summaries(roster.lifting_order());
            if summaries.is_empty() {
                println!("group {group} has no athletes");
            }
            for (position, summary) in summaries.iter().enumerate() {
                println!("{}", order_line(position + 1, summary));
            }
        }
        Command::StartNumbers { group, dry_run } => {
            storage.assign_start_numbers(GroupId(group))?;
            let roster = Roster::load(storage.load_group(GroupId(group))?);
            let mut numbered: Vec<_> = roster.athletes().iter().collect();
            numbered.sort_by_key(|a| a.start_number);
            for athlete in numbered {
                println!(
                    "{:>3} {} ({})",
                    athlete.start_number.unwrap_or_default(),
                    athlete.full_name(),
                    athlete.category
                );
            }
            if dry_run {
                println!("dry run: {} not written", cli.competition.display());
            } else {
                storage.write_json_file(&cli.competition)?;
                println!("updated {}", cli.competition.display());
            }
        }
        Command::Records { group, athlete } => {
            let roster = Roster::load(storage.load_group(GroupId(group))?);
            let current = athlete.map(AthleteId).or_else(|| roster.first_to_lift());
            let mut cache = RecordCache::default();
            cache.refresh_group(&storage, &roster);
            cache.refresh_athlete(current.and_then(|id| roster.get(id)));
            println!(
                "{}",
                serde_json::to_string_pretty(&cache.projection(&roster, current))?
            );
        }
    }

    Ok(())
}

fn order_line(position: usize, summary: &AthleteSummary) -> String {
    let lift = match summary.lift_kind {
        LiftKind::Snatch => "snatch",
        LiftKind::CleanJerk => "c&j",
    };
    let start = summary
        .start_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-".into());
    if summary.done {
        return format!("{position:>3}. [{start}] {} ({}) done", summary.name, summary.team);
    }
    format!(
        "{position:>3}. [{start}] {} ({}) {lift} #{} {}kg",
        summary.name, summary.team, summary.attempt_number, summary.requested_weight
    )
}
