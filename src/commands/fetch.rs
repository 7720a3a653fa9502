//! Fetch command - downloads, expands and classifies kext releases.

use anyhow::{bail, Context, Result};
use std::path::Path;

use efistage::assets::{self, catalog, stage, AcquireOutcome, AssetSpec, Pipeline, CATALOG};
use efistage::config::Config;
use efistage::opencore::{self, profile};

/// What to fetch.
pub enum FetchSelection {
    /// Every catalog entry.
    All,
    /// Catalog entries by name.
    Names(Vec<String>),
    /// Whatever a profile's config loads.
    Profile(String),
}

/// Resolve a selection to catalog entries.
pub fn select_specs(selection: &FetchSelection) -> Result<Vec<&'static AssetSpec>> {
    match selection {
        FetchSelection::All => Ok(CATALOG.iter().collect()),
        FetchSelection::Names(names) => {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            let (found, unknown) = catalog::select(&names);
            if !unknown.is_empty() {
                let known: Vec<&str> = CATALOG.iter().map(|s| s.name).collect();
                bail!(
                    "Unknown kext(s): {}. Known: {}",
                    unknown.join(", "),
                    known.join(", ")
                );
            }
            Ok(found)
        }
        FetchSelection::Profile(name) => {
            let profile = profile::resolve(name)?;
            let (specs, unknown) = opencore::required_kexts(&profile)?;
            for bundle in unknown {
                println!("  Note: {} has no release source; stage it by hand", bundle);
            }
            Ok(specs)
        }
    }
}

/// Acquire `specs` one after another and print a line per asset.
pub fn fetch_specs(config: &Config, specs: &[&'static AssetSpec]) -> Result<AcquireOutcome> {
    let pipeline = Pipeline::from_config(config).context("Failed to create HTTP client")?;
    let runtime = assets::runtime().context("Failed to start async runtime")?;

    println!("Fetching {} kext release(s)...", specs.len());
    let outcome = runtime.block_on(pipeline.acquire_all(specs));

    for asset in &outcome.acquired {
        let source = if asset.file.downloaded { "downloaded" } else { "cached" };
        println!(
            "  {:20} {} [{}] -> {} bundle(s)",
            asset.spec.name,
            asset.release.file_name,
            source,
            asset.bundles.len()
        );
    }
    for (spec, err) in &outcome.failures {
        println!("  {:20} FAILED: {}", spec.name, err);
    }
    Ok(outcome)
}

/// Execute the fetch command.
pub fn cmd_fetch(config: &Config, selection: FetchSelection, stage_to: Option<&Path>) -> Result<()> {
    let specs = select_specs(&selection)?;
    if specs.is_empty() {
        println!("Nothing to fetch.");
        return Ok(());
    }

    let outcome = fetch_specs(config, &specs)?;
    if outcome.acquired.is_empty() {
        bail!("No kext could be fetched");
    }

    if let Some(efi_root) = stage_to {
        let bundles: Vec<_> = outcome.bundles().cloned().collect();
        let staged = stage::stage(efi_root, &bundles)?;
        println!("\nStaged {} bundle(s) into {}", staged.len(), stage::kexts_dir(efi_root).display());
    }

    if !outcome.all_succeeded() {
        println!("\n{} kext(s) failed; continuing without them.", outcome.failures.len());
    }
    Ok(())
}
