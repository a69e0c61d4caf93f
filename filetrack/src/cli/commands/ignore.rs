//! Ignore command: edit and list `.trackignore` rules

use anyhow::Result;
use clap::Subcommand;
use filetrack_core::{IgnoreEngine, TrackerConfig};
use std::path::PathBuf;

#[derive(Debug, Subcommand)]
pub enum IgnoreCommand {
    /// Append rules to a rule file
    Add {
        /// Rule lines, e.g. `*.log` or `!keep.log`
        #[arg(required = true)]
        rules: Vec<String>,

        /// Directory whose rule file to edit (defaults to the root)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Remove rules from a rule file
    Remove {
        #[arg(required = true)]
        rules: Vec<String>,

        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// List every compiled rule in evaluation order
    List,
}

pub async fn execute(config: TrackerConfig, command: IgnoreCommand) -> Result<()> {
    let engine = IgnoreEngine::new(
        &config.root,
        config.rule_file_name.clone(),
        config.case_insensitive,
        config.retry.clone(),
    );
    engine.load();

    match command {
        IgnoreCommand::Add { rules, dir } => {
            let dir = dir.map(std::path::absolute).transpose()?;
            let added = engine.add_rules(dir.as_deref(), &rules.join("\n")).await?;
            println!("Added {} rules", added);
        }
        IgnoreCommand::Remove { rules, dir } => {
            let dir = dir.map(std::path::absolute).transpose()?;
            let removed = engine.remove_rules(dir.as_deref(), &rules.join("\n")).await?;
            println!("Removed {} rules", removed);
        }
        IgnoreCommand::List => {
            let rules = engine.rules();
            if rules.is_empty() {
                println!("No rules loaded");
            }
            for rule in rules.rules() {
                let marker = if rule.is_include() { "include" } else { "exclude" };
                println!(
                    "{:<8} {:<30} {}:{}",
                    marker,
                    rule.glob_pattern,
                    rule.source.display(),
                    rule.line
                );
            }
        }
    }

    Ok(())
}
