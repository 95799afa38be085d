use crate::infra::{
    default_medal_bands, parse_band, parse_score, InMemoryBandStore, InMemorySampleStore,
};
use clap::Args;
use contest_scoring::config::ScoringConfig;
use contest_scoring::error::AppError;
use contest_scoring::scoring::{
    classify, BandsRecalculation, CommitReport, MedalBand, MedalBandRegistry,
    RecalculationCoordinator, SampleId, ScoreRecordStore, ScoringService,
};
use std::num::NonZeroUsize;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Maximum concurrent row writes during the commit step.
    #[arg(long)]
    pub(crate) concurrency: Option<NonZeroUsize>,
    /// Stop before writing dirty rows to the sample store.
    #[arg(long)]
    pub(crate) skip_commit: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ClassifyArgs {
    /// Judge score (0-100); repeat once per judge, up to five.
    #[arg(long = "score", required = true, value_parser = parse_score)]
    pub(crate) scores: Vec<f64>,
    /// Medal band as label:min:max:order; repeatable. Defaults to the
    /// standard contest table.
    #[arg(long = "band", value_parser = parse_band)]
    pub(crate) bands: Vec<MedalBand>,
}

type DemoService = ScoringService<InMemorySampleStore, InMemoryBandStore>;

pub(crate) fn run_classify(args: ClassifyArgs) -> Result<(), AppError> {
    let ClassifyArgs { scores, bands } = args;
    let bands = if bands.is_empty() {
        default_medal_bands()
    } else {
        bands
    };

    let registry = MedalBandRegistry::from_persisted(bands);
    for warning in registry.malformed_bands() {
        println!("warning: {warning}");
    }

    let sample_id = SampleId::new("cli");
    let mut store = ScoreRecordStore::new();
    store.open_sample(sample_id.clone())?;
    for (slot, value) in scores.into_iter().enumerate() {
        store.set_score(&sample_id, slot, Some(value))?;
    }

    let outcome = RecalculationCoordinator::new().on_score_changed(
        &sample_id,
        &registry.active_bands_ordered(),
        &mut store,
    )?;

    match outcome.aggregate {
        Some(aggregate) => println!("aggregate: {aggregate:.2}"),
        None => println!("aggregate: -"),
    }
    println!("medal: {}", outcome.medal.as_deref().unwrap_or("none"));
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        concurrency,
        skip_commit,
    } = args;

    let samples = Arc::new(InMemorySampleStore::default());
    let bands = Arc::new(InMemoryBandStore::with_bands(default_medal_bands()));
    let config = ScoringConfig {
        commit_concurrency: concurrency,
    };
    let service: Arc<DemoService> =
        Arc::new(ScoringService::new(samples.clone(), bands, &config));
    service.load_bands().await?;

    println!("Contest scoring demo");
    println!("Medal table:");
    for band in service.active_bands() {
        println!(
            "  {:>2}. {:<10} {:>6.2} - {:>6.2}",
            band.order, band.label, band.min, band.max
        );
    }

    println!("\nPartial panel");
    let partial = SampleId::new("vino-101");
    service.open_sample(partial.clone())?;
    for (slot, value) in [(0, 92.0), (1, 90.0), (2, 91.0)] {
        service.set_score(&partial, slot, Some(value))?;
    }
    print_sample(&service, &partial)?;

    println!("\nUntasted sample");
    let untasted = SampleId::new("vino-102");
    service.open_sample(untasted.clone())?;
    print_sample(&service, &untasted)?;

    for (id, scores) in [
        ("aceite-201", [95.0, 96.0, 94.0]),
        ("aceite-202", [88.0, 86.0, 87.0]),
        ("aceite-203", [90.0, 91.0, 89.0]),
    ] {
        let sample_id = SampleId::new(id);
        service.open_sample(sample_id.clone())?;
        for (slot, value) in scores.into_iter().enumerate() {
            service.set_score(&sample_id, slot, Some(value))?;
        }
    }

    println!("\nOverlapping bands resolve to the earlier band");
    let overlapping = [
        MedalBand::new("Mencion", 0.0, 69.99, 1),
        MedalBand::new("Aprobado", 60.0, 100.0, 2),
    ];
    println!(
        "  aggregate 65.00 -> {}",
        classify(Some(65.0), &overlapping).unwrap_or("none")
    );

    println!("\nRaising the Oro floor to 91");
    let edit = service.upsert_band(
        MedalBand::new("Oro", 91.0, 93.99, 2)
            .with_id("oro")
            .with_color("#ffd700"),
    )?;
    print_recalculation(&edit.recalculation);

    if skip_commit {
        println!("\n{} rows left dirty", service.dirty_ids().len());
    } else {
        let report = service.commit_dirty().await;
        print_commit(&report);
        let sync = service.sync_bands().await;
        println!(
            "  bands saved {} | deleted {} | failed {}",
            sync.saved.len(),
            sync.deleted.len(),
            sync.failed.len()
        );
        println!("  sample store holds {} rows", samples.rows().len());
    }

    println!("\nStandings");
    for entry in service.standings() {
        println!(
            "  {:>2}. {:<11} {:>6.2} ({} judges) {}",
            entry.rank,
            entry.sample_id.as_str(),
            entry.aggregate,
            entry.judges,
            entry.medal.as_deref().unwrap_or("-")
        );
    }

    let tally = service.medal_tally();
    println!("\nMedal tally");
    for (label, count) in &tally.medals {
        println!("  {label}: {count}");
    }
    println!(
        "  unclassified: {} | untasted: {}",
        tally.unclassified, tally.untasted
    );

    Ok(())
}

fn print_sample(service: &DemoService, sample_id: &SampleId) -> Result<(), AppError> {
    let record = service.record(sample_id)?;
    let scores: Vec<String> = record
        .scores()
        .slots()
        .iter()
        .map(|slot| slot.map_or_else(|| "-".to_string(), |value| format!("{value}")))
        .collect();
    println!(
        "- {} scores [{}] -> aggregate {} | medal {}",
        sample_id,
        scores.join(", "),
        record
            .aggregate()
            .map_or_else(|| "-".to_string(), |value| format!("{value:.2}")),
        record.medal().unwrap_or("none")
    );
    Ok(())
}

fn print_recalculation(outcome: &BandsRecalculation) {
    println!(
        "- examined {} scored samples, {} reclassified",
        outcome.examined,
        outcome.reclassified.len()
    );
    for change in &outcome.reclassified {
        println!(
            "  {}: {} -> {}",
            change.sample_id,
            change.previous.as_deref().unwrap_or("none"),
            change.medal.as_deref().unwrap_or("none")
        );
    }
}

fn print_commit(report: &CommitReport) {
    println!(
        "\nCommitted {} of {} dirty rows",
        report.succeeded.len(),
        report.attempted()
    );
    for failure in &report.failed {
        println!(
            "  {} failed ({:?}): {}",
            failure.sample_id, failure.error_kind, failure.message
        );
    }
}
