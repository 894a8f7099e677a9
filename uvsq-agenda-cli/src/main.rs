mod commands;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "uvsq-agenda")]
#[command(about = "Synchronisation de l'emploi du temps UVSQ vers Google Agenda")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Activer les journaux détaillés
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Période et groupe à récupérer
#[derive(Args)]
struct ScheduleArgs {
    /// Identifiant du groupe Celcat (federationIds)
    #[arg(short, long)]
    group: String,

    /// Premier jour (format : YYYY-MM-DD)
    #[arg(short, long)]
    start: NaiveDate,

    /// Dernier jour (format : YYYY-MM-DD)
    #[arg(short, long)]
    end: NaiveDate,

    /// Palette de couleurs au format JSON
    #[arg(long, env = "UVSQ_PALETTE")]
    palette: Option<PathBuf>,

    /// URL de GetCalendarData
    #[arg(long, env = "UVSQ_EDT_URL")]
    endpoint: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Récupérer l'emploi du temps et créer les événements dans Google Agenda
    Sync {
        #[command(flatten)]
        schedule: ScheduleArgs,

        /// Jeton d'accès OAuth Google
        #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
        token: String,

        /// Nom de l'agenda ({group} est remplacé par le groupe)
        #[arg(long)]
        calendar_name: Option<String>,

        /// Délai maximal d'envoi du lot (secondes)
        #[arg(long)]
        deadline: Option<u64>,

        /// Ne pas changer la couleur de l'agenda
        #[arg(long)]
        keep_color: bool,
    },

    /// Afficher les événements qui seraient créés, sans rien envoyer
    Preview {
        #[command(flatten)]
        schedule: ScheduleArgs,
    },

    /// Afficher la palette de couleurs
    Palette {
        /// Palette de couleurs au format JSON
        #[arg(long, env = "UVSQ_PALETTE")]
        palette: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Niveau de journalisation
    let log_level = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("uvsq_agenda_cli={log_level},uvsq_agenda_core={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Sync {
            schedule,
            token,
            calendar_name,
            deadline,
            keep_color,
        } => {
            commands::sync_command(commands::SyncParams {
                schedule: schedule.into(),
                token,
                calendar_name,
                deadline_secs: deadline,
                keep_color,
            })
            .await
        }

        Commands::Preview { schedule } => commands::preview_command(schedule.into()).await,

        Commands::Palette { palette } => commands::palette_command(palette),
    }
}

impl From<ScheduleArgs> for commands::ScheduleParams {
    fn from(args: ScheduleArgs) -> Self {
        Self {
            group: args.group,
            start: args.start,
            end: args.end,
            palette: args.palette,
            endpoint: args.endpoint,
        }
    }
}
