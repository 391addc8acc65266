use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};

use crate::import::ImportResult;
use megasena_core::CoreResult;
use megasena_core::correlation::RetroCorrelationReport;
use megasena_core::games::GameSet;
use megasena_core::overfitting::{OverfittingVerdict, RiskLevel};
use megasena_core::pipeline::ConservativeReport;
use megasena_core::selector::{SelectionStatus, UniverseSelection};
use megasena_core::stats::{ConfidenceMetric, Consistency};
use megasena_core::validation::ValidationReport;
use megasena_db::models::{Draw, format_numbers};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn opt(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "—".to_string(),
    }
}

fn consistency_cell(metric: &ConfidenceMetric) -> Cell {
    let consistency = metric.consistency();
    let color = match consistency {
        Consistency::High => Color::Green,
        Consistency::Medium => Color::Yellow,
        Consistency::Low | Consistency::Undefined => Color::Red,
    };
    Cell::new(consistency.to_string()).fg(color)
}

fn risk_cell(risk: RiskLevel) -> Cell {
    let color = match risk {
        RiskLevel::Low => Color::Green,
        RiskLevel::Medium => Color::Yellow,
        RiskLevel::High => Color::Red,
    };
    Cell::new(risk.to_string()).fg(color)
}

pub fn display_draws(draws: &[Draw]) {
    if draws.is_empty() {
        println!("Aucun tirage à afficher.");
        return;
    }

    let mut table = new_table(vec!["Concours", "Date", "Numéros"]);
    for draw in draws {
        table.add_row(vec![
            draw.sequence_id.to_string(),
            draw.date.format("%d/%m/%Y").to_string(),
            format_numbers(&draw.numbers),
        ]);
    }
    println!("{table}");
}

pub fn display_import_summary(result: &ImportResult) {
    println!("Import terminé :");
    println!("  Total lignes lues : {}", result.total_records);
    println!("  Insérés           : {}", result.inserted);
    println!("  Doublons ignorés  : {}", result.skipped);
    if result.errors > 0 {
        println!("  Erreurs           : {}", result.errors);
    }
}

pub fn display_indicator_metrics(metrics: &[(String, CoreResult<ConfidenceMetric>)], window: usize) {
    println!("\n📊 Indicateurs sur les {} derniers tirages\n", window);

    let mut table = new_table(vec![
        "Indicateur",
        "n",
        "Moyenne (IC)",
        "Écart-type",
        "CV",
        "Consistance",
        "Attendu",
        "p-valeur",
    ]);
    for (name, metric) in metrics {
        match metric {
            Ok(m) => table.add_row(vec![
                Cell::new(name),
                Cell::new(m.n),
                Cell::new(m.to_string()),
                Cell::new(format!("{:.3}", m.stddev)),
                Cell::new(opt(m.coefficient_of_variation, 3)),
                consistency_cell(m),
                Cell::new(format!("{:.3}", m.null_hypothesis)),
                Cell::new(format!("{:.4}", m.p_value)),
            ]),
            Err(e) => table.add_row(vec![
                Cell::new(name),
                Cell::new(e.to_string()).fg(Color::Red),
            ]),
        };
    }
    println!("{table}");
}

pub fn display_validation(report: &ValidationReport) {
    println!(
        "\n🔬 Validation train/test ({} / {} tirages, ratio {:.0}%)\n",
        report.train_size,
        report.test_size,
        report.train_ratio * 100.0
    );

    let mut table = new_table(vec![
        "Indicateur",
        "Train",
        "Test",
        "Dégradation",
        "CV max",
        "Écart significatif",
    ]);
    for v in &report.indicators {
        if let Some(e) = v.error() {
            table.add_row(vec![Cell::new(&v.name), Cell::new(e.to_string()).fg(Color::Red)]);
            continue;
        }
        let metric = |m: &CoreResult<ConfidenceMetric>| match m {
            Ok(m) => m.to_string(),
            Err(e) => e.to_string(),
        };
        let significant = match &v.comparison {
            Some(c) if c.significant => format!("oui (p = {:.4})", c.p_value),
            Some(c) => format!("non (p = {:.4})", c.p_value),
            None => "—".to_string(),
        };
        table.add_row(vec![
            Cell::new(&v.name),
            Cell::new(metric(&v.train)),
            Cell::new(metric(&v.test)),
            Cell::new(v.degradation.map_or("—".to_string(), |d| format!("{:+.1}%", d * 100.0))),
            Cell::new(opt(v.max_cv(), 3)),
            Cell::new(significant),
        ]);
    }
    println!("{table}");

    if let Some(h) = &report.holdout {
        println!(
            "Rejeu hors échantillon TOP {} : taux {:.1}% (train) → {:.1}% (test), dégradation {}",
            h.tier.len(),
            h.in_sample.hit_rate * 100.0,
            h.out_of_sample.hit_rate * 100.0,
            h.hit_rate_degradation
                .map_or("—".to_string(), |d| format!("{:+.1}%", d * 100.0))
        );
    }
}

pub fn display_verdict(verdict: &OverfittingVerdict) {
    println!("\n⚠️  Risque de surapprentissage\n");

    let mut table = new_table(vec!["Indicateur", "Critères déclenchés"]);
    for a in &verdict.assessments {
        let criteria = match &a.undetermined {
            Some(reason) => format!("indéterminé ({reason})"),
            None if a.triggered.is_empty() => "aucun".to_string(),
            None => a
                .triggered
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        };
        table.add_row(vec![Cell::new(&a.name), Cell::new(criteria)]);
    }
    println!("{table}");

    let mut summary = new_table(vec!["Niveau de risque"]);
    summary.add_row(vec![risk_cell(verdict.risk_level)]);
    println!("{summary}");
    for line in &verdict.recommendations {
        println!("  • {line}");
    }
}

pub fn display_retro(report: &RetroCorrelationReport, title: &str) {
    println!("\n🔁 {title}\n");

    let mut table = new_table(vec!["Mesure", "Valeur"]);
    table.add_row(vec!["Tirages rejoués".to_string(), report.window_size.to_string()]);
    table.add_row(vec![
        format!("Taux ≥ {} numéros", report.hit_threshold),
        format!("{:.1}%", report.hit_rate * 100.0),
    ]);
    table.add_row(vec![
        "Référence aléatoire".to_string(),
        format!("{:.1}%", report.random_baseline_hit_rate * 100.0),
    ]);
    table.add_row(vec!["Gain sur le hasard".to_string(), opt(report.lift_over_random(), 2)]);
    table.add_row(vec!["Numéros trouvés (moy.)".to_string(), format!("{:.2}", report.mean_hits)]);
    table.add_row(vec![
        "Corrélation moyenne".to_string(),
        format!("{:.3}", report.mean_correlation),
    ]);
    table.add_row(vec![
        "Score de surapprentissage".to_string(),
        format!("{:.3}", report.overfitting_score),
    ]);
    if let Some(best) = &report.best_draw {
        table.add_row(vec![
            "Meilleur concours".to_string(),
            format!("{} ({} numéros)", best.sequence_id, best.hits),
        ]);
    }
    if let Some(worst) = &report.worst_draw {
        table.add_row(vec![
            "Pire concours".to_string(),
            format!("{} ({} numéros)", worst.sequence_id, worst.hits),
        ]);
    }
    println!("{table}");

    let distribution = report
        .hit_distribution
        .iter()
        .enumerate()
        .map(|(k, c)| format!("{k}:{c}"))
        .collect::<Vec<_>>()
        .join("  ");
    println!("Répartition des numéros trouvés : {distribution}");
}

pub fn display_selection(selection: &UniverseSelection) {
    println!("\n🎯 Univers conservateur ({})\n", selection.ranking_source);

    let mut table = new_table(vec!["Indicateur", "Stabilité", "Poids"]);
    for (r, w) in selection.indicators.iter().zip(&selection.weights) {
        table.add_row(vec![
            r.name.clone(),
            format!("{:.3}", r.stability),
            format!("{:.1}%", w.weight * 100.0),
        ]);
    }
    println!("{table}");

    let mut tiers = new_table(vec!["Palier", "Numéros"]);
    for tier in &selection.tiers {
        tiers.add_row(vec![tier.label(), format_numbers(&tier.sorted_numbers())]);
    }
    println!("{tiers}");

    let cv = &selection.cross_validation;
    let status_color = match selection.status {
        SelectionStatus::Accepted => Color::Green,
        SelectionStatus::RetryExhausted { .. } => Color::Red,
    };
    let mut status = new_table(vec!["Validation croisée", "Tentatives", "Taux TOP", "Corrélation"]);
    status.add_row(vec![
        Cell::new(selection.status.to_string()).fg(status_color),
        Cell::new(selection.attempts),
        Cell::new(format!("{:.1}%", cv.primary.report.hit_rate * 100.0)),
        Cell::new(format!("{:.3}", cv.primary.report.mean_correlation)),
    ]);
    println!("{status}");
    println!(
        "Univers construit sur {} tirages, validé sur les {} suivants.",
        cv.reference_size, cv.window_size
    );
}

pub fn display_game_set(set: &GameSet, limit: usize) {
    println!(
        "\n🎲 TOP {} : {} jeux (graine {})",
        set.tier_size,
        set.games.len(),
        set.seed
    );
    if set.games.len() < set.requested {
        println!("  {} demandés, limité au nombre de combinaisons.", set.requested);
    }
    if set.filter_violations > 0 {
        println!(
            "  ⚠️  {} jeux hors filtres (aucune combinaison conforme restante).",
            set.filter_violations
        );
    }

    let mut table = new_table(vec!["#", "Numéros"]);
    for (i, game) in set.games.iter().take(limit).enumerate() {
        table.add_row(vec![format!("{}", i + 1), format_numbers(game)]);
    }
    println!("{table}");
    if set.games.len() > limit {
        println!("  ... {} jeux supplémentaires dans le rapport JSON", set.games.len() - limit);
    }

    let inclusion = set
        .inclusion
        .iter()
        .map(|(n, c)| format!("{:02}×{}", n, c))
        .collect::<Vec<_>>()
        .join("  ");
    println!("Inclusion : {inclusion}");
}

pub fn display_conservative(report: &ConservativeReport, games_shown: usize) {
    println!(
        "\nMode conservateur : {} tirages (dernier concours {})",
        report.history_size,
        report.last_sequence_id.map_or("—".to_string(), |id| id.to_string())
    );

    display_validation(&report.validation);
    display_verdict(&report.verdict);

    match &report.selection {
        Ok(selection) => display_selection(selection),
        Err(e) => {
            println!("\n❌ Sélection impossible : {e}");
            println!("Risque effectif : {}", report.effective_risk());
            return;
        }
    }

    for set in &report.game_sets {
        display_game_set(set, games_shown);
    }
    if let Some(retro) = &report.retro {
        display_retro(
            retro,
            "Corrélation rétroactive pas à pas (palier reconstruit avant chaque tirage)",
        );
    }
    println!(
        "\n{} combinaisons possibles dans le palier principal.",
        report.top_combinations.len()
    );
}
