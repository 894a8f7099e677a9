use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use uvsq_agenda_core::{calendar::google::GoogleCalendarClient, prelude::*};

/// Groupe, période et sources communes à `sync` et `preview`
pub struct ScheduleParams {
    pub group: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub palette: Option<PathBuf>,
    pub endpoint: Option<String>,
}

impl ScheduleParams {
    fn request(&self) -> SyncRequest {
        SyncRequest {
            group_id: self.group.clone(),
            start: self.start,
            end: self.end,
        }
    }

    fn provider(&self) -> Result<CelcatProvider> {
        let mut config = ProviderConfig::default();
        if let Some(endpoint) = &self.endpoint {
            config.base_url.clone_from(endpoint);
        }
        tracing::debug!("Source de l'emploi du temps: {}", config.base_url);
        Ok(CelcatProvider::with_config(&config)?)
    }
}

/// Paramètres de la commande `sync`
pub struct SyncParams {
    pub schedule: ScheduleParams,
    pub token: String,
    pub calendar_name: Option<String>,
    pub deadline_secs: Option<u64>,
    pub keep_color: bool,
}

/// Palette built-in, ou chargée depuis un fichier JSON
fn load_palette(path: Option<&PathBuf>) -> Result<ColorPalette> {
    match path {
        Some(path) => ColorPalette::from_path(path)
            .with_context(|| format!("Impossible de charger la palette {}", path.display())),
        None => Ok(ColorPalette::builtin().clone()),
    }
}

/// Commande de synchronisation
pub async fn sync_command(params: SyncParams) -> Result<()> {
    let request = params.schedule.request();
    tracing::info!(
        "Synchronisation du groupe {} du {} au {}",
        request.group_id,
        request.start,
        request.end
    );

    let palette = load_palette(params.schedule.palette.as_ref())?;
    let provider = params.schedule.provider()?;
    let calendar = GoogleCalendarClient::new(params.token)?;

    let mut options = SyncOptions {
        submit_deadline: params.deadline_secs.map(Duration::from_secs),
        randomize_calendar_color: !params.keep_color,
        ..SyncOptions::default()
    };
    if let Some(name) = params.calendar_name {
        options.calendar_name_template = name;
    }

    println!("Récupération de l'emploi du temps...");
    let pipeline = SyncPipeline::new(&provider, &palette, options);
    let report = pipeline.run(&request, &calendar).await?;

    println!(
        "✓ Agenda « {} » ({})",
        report.calendar_name, report.calendar_id
    );
    println!("✓ {} séances récupérées", report.fetched);
    println!(
        "✓ {}/{} événements créés",
        report.succeeded, report.submitted
    );
    for warning in report.warnings() {
        println!("✗ {warning}");
    }

    Ok(())
}

/// Commande d'aperçu: récupère et convertit sans rien envoyer
pub async fn preview_command(params: ScheduleParams) -> Result<()> {
    let request = params.request();
    let palette = load_palette(params.palette.as_ref())?;
    let provider = params.provider()?;

    let pipeline = SyncPipeline::new(&provider, &palette, SyncOptions::default());
    let payloads = pipeline.preview(&request).await?;

    println!("{}", serde_json::to_string_pretty(&payloads)?);
    eprintln!("{} événements", payloads.len());

    Ok(())
}

/// Liste la palette de couleurs
pub fn palette_command(path: Option<PathBuf>) -> Result<()> {
    let palette = load_palette(path.as_ref())?;

    println!("Palette {}:", palette.version());
    for (event_type, color) in palette.entries() {
        println!("  {} -> {}", event_type, describe_color(color));
    }
    println!("  (autres) -> {}", describe_color(palette.default_color()));

    Ok(())
}

fn describe_color(color: &ColorToken) -> String {
    color
        .as_id()
        .map_or_else(|| "couleur de l'agenda".to_string(), |id| format!("colorId {id}"))
}
