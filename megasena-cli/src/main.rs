mod display;
mod import;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use megasena_core::advisory::{IndicatorAdvisor, StaticAdvisor};
use megasena_core::config::{PipelineConfig, load_config, save_config};
use megasena_core::history::History;
use megasena_core::indicators::default_registry;
use megasena_core::overfitting::detect;
use megasena_core::pipeline::run_conservative;
use megasena_core::selector::walk_forward::walk_forward;
use megasena_core::validation::validate;
use megasena_db::db::{count_draws, db_path, fetch_history, fetch_last_draws, migrate, open_db};
use megasena_db::rusqlite::Connection;

use crate::display::{
    display_conservative, display_draws, display_import_summary, display_indicator_metrics,
    display_retro, display_validation, display_verdict,
};

#[derive(Parser)]
#[command(name = "megasena", about = "Analyse statistique conservatrice de la Mega-Sena")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Importer les tirages depuis un fichier CSV (Concurso;Data;Bola1..Bola6)
    Import {
        /// Chemin vers le fichier CSV
        #[arg(short, long, default_value = "data/megasena.csv")]
        file: PathBuf,
    },

    /// Afficher le chemin de la base de données
    DbPath,

    /// Lister les derniers tirages
    List {
        /// Nombre de tirages à afficher
        #[arg(short, long, default_value = "10")]
        last: u32,
    },

    /// Métriques de confiance de chaque indicateur
    Stats {
        /// Fenêtre d'analyse (nombre de tirages)
        #[arg(short, long, default_value = "200")]
        window: u32,

        /// Fichier de configuration JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validation train/test et risque de surapprentissage
    Validate {
        /// Fichier de configuration JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Mode conservateur : sélection validée, paliers et jeux
    Conservative {
        /// Fichier de configuration JSON
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Suggestions d'indicateurs (JSON { "indicators": [...] })
        #[arg(short, long)]
        advice: Option<PathBuf>,

        /// Rapport JSON produit
        #[arg(short, long, default_value = "megasena_conservateur.json")]
        output: PathBuf,

        /// Nombre de jeux par palier
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Seed pour la reproductibilité (défaut : celle du fichier de configuration, sinon date du jour)
        #[arg(long)]
        seed: Option<u64>,

        /// Validation pas à pas supplémentaire sur les N derniers tirages
        #[arg(long)]
        walk_forward: Option<usize>,

        /// Jeux affichés par palier
        #[arg(long, default_value = "10")]
        show: usize,
    },

    /// Écrire la configuration par défaut
    Config {
        #[arg(short, long, default_value = "megasena_config.json")]
        output: PathBuf,
    },
}

/// Seed déterministe basé sur la date du jour (YYYYMMDD).
fn date_seed() -> u64 {
    let today = chrono::Local::now().date_naive();
    let y = today.year() as u64;
    let m = today.month() as u64;
    let d = today.day() as u64;
    y * 10_000 + m * 100 + d
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let path = db_path();
    let conn = open_db(&path)?;
    migrate(&conn)?;

    match cli.command {
        Command::Import { file } => cmd_import(&conn, &file),
        Command::DbPath => {
            println!("{}", path.display());
            Ok(())
        }
        Command::List { last } => cmd_list(&conn, last),
        Command::Stats { window, config } => cmd_stats(&conn, window, config.as_deref()),
        Command::Validate { config } => cmd_validate(&conn, config.as_deref()),
        Command::Conservative {
            config,
            advice,
            output,
            count,
            seed,
            walk_forward,
            show,
        } => {
            let from_file = config.is_some();
            let mut config = read_config(config.as_deref())?;
            apply_overrides(&mut config, seed, count, from_file);
            cmd_conservative(&conn, config, advice.as_deref(), &output, walk_forward, show)
        }
        Command::Config { output } => {
            save_config(&PipelineConfig::default(), &output)?;
            println!("Configuration par défaut écrite dans {}", output.display());
            Ok(())
        }
    }
}

fn read_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => load_config(p),
        None => Ok(PipelineConfig::default()),
    }
}

/// Options de la ligne de commande par-dessus la configuration. Sans `--seed`,
/// la graine du fichier est conservée ; la date du jour ne sert qu'en
/// l'absence de fichier.
fn apply_overrides(config: &mut PipelineConfig, seed: Option<u64>, count: Option<usize>, from_file: bool) {
    match seed {
        Some(seed) => config.games.seed = seed,
        None if !from_file => config.games.seed = date_seed(),
        None => {}
    }
    if let Some(count) = count {
        config.games.count = count;
    }
}

/// Historique complet, `None` si la base est vide.
fn load_history(conn: &Connection) -> Result<Option<History>> {
    if count_draws(conn)? == 0 {
        println!("Base vide. Lancez d'abord : megasena import");
        return Ok(None);
    }
    let history = History::new(fetch_history(conn)?).context("Historique invalide")?;
    info!("{} tirages chargés", history.len());
    Ok(Some(history))
}

fn cmd_import(conn: &Connection, file: &Path) -> Result<()> {
    let result = import::import_csv(conn, file)?;
    display_import_summary(&result);
    Ok(())
}

fn cmd_list(conn: &Connection, last: u32) -> Result<()> {
    let n = count_draws(conn)?;
    if n == 0 {
        println!("Base vide. Lancez d'abord : megasena import");
        return Ok(());
    }
    let draws = fetch_last_draws(conn, last)?;
    display_draws(&draws);
    Ok(())
}

fn cmd_stats(conn: &Connection, window: u32, config: Option<&Path>) -> Result<()> {
    let config = read_config(config)?;
    let n = count_draws(conn)?;
    if n == 0 {
        println!("Base vide. Lancez d'abord : megasena import");
        return Ok(());
    }
    let mut draws = fetch_last_draws(conn, window.min(n))?;
    draws.reverse();

    let registry = default_registry();
    let names = registry.resolve(config.indicators.as_deref())?;
    let metrics = registry.confidence_metrics(&names, &draws, &config.stats);
    display_indicator_metrics(&metrics, draws.len());
    Ok(())
}

fn cmd_validate(conn: &Connection, config: Option<&Path>) -> Result<()> {
    let config = read_config(config)?;
    let Some(history) = load_history(conn)? else {
        return Ok(());
    };

    let registry = default_registry();
    let names = registry.resolve(config.indicators.as_deref())?;
    let report = validate(&history, &registry, &names, &config)?;
    display_validation(&report);
    display_verdict(&detect(&report, &config.overfitting));
    Ok(())
}

fn cmd_conservative(
    conn: &Connection,
    config: PipelineConfig,
    advice: Option<&Path>,
    output: &Path,
    walk_forward_last: Option<usize>,
    show: usize,
) -> Result<()> {
    let Some(history) = load_history(conn)? else {
        return Ok(());
    };
    let registry = default_registry();

    let advisor = advice.map(StaticAdvisor::from_file).transpose()?;
    let report = run_conservative(
        &history,
        &registry,
        &config,
        advisor.as_ref().map(|a| a as &dyn IndicatorAdvisor),
    )?;
    display_conservative(&report, show);

    let json = serde_json::to_string_pretty(&report).context("Sérialisation du rapport")?;
    std::fs::write(output, json).with_context(|| format!("Impossible d'écrire {:?}", output))?;
    println!("\nRapport écrit dans {}", output.display());

    if let (Some(last_n), Some(selection)) = (walk_forward_last, report.selection()) {
        let pb = ProgressBar::new(last_n as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("=> "),
        );
        let tick = || pb.inc(1);
        let retro = walk_forward(
            &history,
            &registry,
            &selection.weights,
            &config,
            last_n,
            Some(&tick),
        )?;
        pb.finish_and_clear();
        display_retro(&retro, "Validation pas à pas (univers reconstruit avant chaque tirage)");
    }

    Ok(())
}
