use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::{OutputMode, emit_outcome, emit_success};
use owo_colors::OwoColorize;
use proofkb::config::{self, ProofConfig};
use proofkb::entity::Entity;
use proofkb::interchange::Interchange;
use proofkb::outcome::{Outcome, counts_json};
use proofkb::remap::RemapReport;
use proofkb::storage::SqliteStore;
use proofkb::ui::{Icons, banner, counts_table, info, section, status, success, warn};
use proofkb::{Table, render};
use serde_json::json;

pub fn run_version(output_mode: OutputMode) -> anyhow::Result<()> {
    if output_mode.is_human() {
        banner(
            &format!("{}", "Proofkb".bold().style(proofkb::ui::theme().info.clone())),
            &format!("Version {}", env!("CARGO_PKG_VERSION").bold())
        );
    } else {
        let data = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "bundleVersion": proofkb::bundle::FORMAT_VERSION,
        });
        emit_success(output_mode, "version", data)?;
    }
    Ok(())
}

pub fn run_init(
    output_mode: OutputMode,
    config_path: Option<&Path>,
    database: Option<&Path>,
    force: bool,
) -> anyhow::Result<()> {
    let config_path = config_path.map(Path::to_path_buf).unwrap_or_else(config::default_config_path);
    let db_path = database
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config::default_database_path_in(Path::new(".")));

    let proof_config = ProofConfig {
        database: Some(db_path.to_string_lossy().into_owned()),
    };
    config::write_config(&config_path, &proof_config, force)?;
    config::ensure_db_dir(&db_path)?;
    let store = SqliteStore::open(&db_path)?;
    let stats = store.stats()?;

    if output_mode.is_human() {
        success("Initialized knowledge base");
        status(Icons::FILE, "Config", &config_path.display().to_string());
        status(Icons::DATABASE, "Database", &db_path.display().to_string());
    } else {
        emit_success(output_mode, "init", json!({
            "config": config_path,
            "database": db_path,
            "counts": counts_json(&stats.counts),
        }))?;
    }
    Ok(())
}

pub fn run_stats(store: &SqliteStore, output_mode: OutputMode) -> anyhow::Result<()> {
    let stats = store.stats()?;
    let integrity = store.integrity_report()?;

    if output_mode.is_human() {
        section(&format!(" {} Knowledge base ", Icons::STATS));
        println!("{}", counts_table(&stats.counts));
        if integrity.has_issues() {
            for (table, count) in &integrity.dangling {
                warn(&format!("{} rows in {} point at missing entities", count, table));
            }
        }
    } else {
        emit_success(output_mode, "stats", json!({
            "counts": counts_json(&stats.counts),
            "dangling": integrity.dangling,
        }))?;
    }
    Ok(())
}

pub fn run_export(store: &mut SqliteStore, output_mode: OutputMode, out: &Path) -> anyhow::Result<bool> {
    let result = Interchange::new(store).export_backup_to(out);
    if let (Ok(summary), true) = (&result, output_mode.is_human()) {
        success(&format!("{} Exported backup to {}", Icons::UP, summary.path.display()));
        println!("{}", counts_table(&summary.counts));
    }
    let payload = result.map(|summary| {
        json!({
            "path": summary.path,
            "exportDate": summary.export_date,
            "counts": counts_json(&summary.counts),
        })
    });
    emit_outcome(output_mode, "export", &Outcome::from_result(payload))
}

pub fn run_restore(store: &mut SqliteStore, output_mode: OutputMode, file: Option<PathBuf>) -> anyhow::Result<bool> {
    let Some(path) = choose_file(file, output_mode, "Backup file to restore")? else {
        return emit_outcome(output_mode, "restore", &Outcome::cancelled());
    };

    let result = Interchange::new(store).restore_backup_from(&path);
    if let (Ok(written), true) = (&result, output_mode.is_human()) {
        success(&format!("{} Restored backup from {}", Icons::DOWN, path.display()));
        println!("{}", counts_table(written));
    }
    let payload = result.map(|written| json!({ "path": path, "counts": counts_json(&written) }));
    emit_outcome(output_mode, "restore", &Outcome::from_result(payload))
}

pub fn run_merge(store: &mut SqliteStore, output_mode: OutputMode, file: Option<PathBuf>) -> anyhow::Result<bool> {
    let Some(path) = choose_file(file, output_mode, "Backup file to merge")? else {
        return emit_outcome(output_mode, "merge", &Outcome::cancelled());
    };

    let result = Interchange::new(store).merge_backup_from(&path);
    if let (Ok(report), true) = (&result, output_mode.is_human()) {
        success(&format!("{} Merged {} rows from {}", Icons::MERGE, total(&report.inserted), path.display()));
        println!("{}", counts_table(&report.inserted));
        info("Links", "relationship rows of a backup are not merged");
    }
    let payload = result.map(|report| report_json(&path, &report));
    emit_outcome(output_mode, "merge", &Outcome::from_result(payload))
}

pub fn run_share(store: &mut SqliteStore, output_mode: OutputMode, document: i64, out: &Path) -> anyhow::Result<bool> {
    let result = Interchange::new(store).export_document_to(document, out);
    if let (Ok(summary), true) = (&result, output_mode.is_human()) {
        success(&format!("{} Shared document #{} to {}", Icons::SHARE, document, summary.path.display()));
        println!("{}", counts_table(&summary.counts));
    }
    let payload = result.map(|summary| {
        json!({
            "document": document,
            "path": summary.path,
            "counts": counts_json(&summary.counts),
        })
    });
    emit_outcome(output_mode, "share", &Outcome::from_result(payload))
}

pub fn run_import(store: &mut SqliteStore, output_mode: OutputMode, file: Option<PathBuf>) -> anyhow::Result<bool> {
    let Some(path) = choose_file(file, output_mode, "Shared document to import")? else {
        return emit_outcome(output_mode, "import", &Outcome::cancelled());
    };

    let result = Interchange::new(store).import_document_from(&path);
    if let (Ok(report), true) = (&result, output_mode.is_human()) {
        success(&format!("{} Imported {} rows from {}", Icons::DOWN, total(&report.inserted), path.display()));
        println!("{}", counts_table(&report.inserted));
        if report.total_dropped() > 0 {
            warn(&format!("{} links dropped: an endpoint was missing from the bundle", report.total_dropped()));
        }
    }
    let payload = result.map(|report| report_json(&path, &report));
    emit_outcome(output_mode, "import", &Outcome::from_result(payload))
}

pub fn run_render(
    store: &SqliteStore,
    output_mode: OutputMode,
    document: i64,
    out: Option<&Path>,
) -> anyhow::Result<bool> {
    let result = render::document_markdown(store, document).and_then(|markdown| {
        if let Some(path) = out {
            std::fs::write(path, &markdown)?;
        }
        Ok(markdown)
    });

    if let (Ok(markdown), true) = (&result, output_mode.is_human()) {
        match out {
            Some(path) => success(&format!("{} Rendered document #{} to {}", Icons::FILE, document, path.display())),
            None => print!("{}", markdown),
        }
    }
    let payload = result.map(|markdown| match out {
        Some(path) => json!({ "document": document, "path": path }),
        None => json!({ "document": document, "markdown": markdown }),
    });
    emit_outcome(output_mode, "render", &Outcome::from_result(payload))
}

pub fn run_add<E: Entity>(store: &SqliteStore, output_mode: OutputMode, command: &str, entity: &E) -> anyhow::Result<bool> {
    let result = store.insert(entity);
    if let (Ok(stored), true) = (&result, output_mode.is_human()) {
        success(&format!("{} Added {} #{}", Icons::NEW, E::TABLE, stored.id()));
    }
    let payload = result.and_then(|stored| Ok(json!({ "id": stored.id(), "row": stored.to_row()? })));
    emit_outcome(output_mode, command, &Outcome::from_result(payload))
}

pub fn run_link_evidence(
    store: &mut SqliteStore,
    output_mode: OutputMode,
    statement: i64,
    evidence: &[i64],
) -> anyhow::Result<bool> {
    let result = store
        .link_evidence_to_statement(statement, evidence)
        .and_then(|()| store.statement_evidence(statement));
    if let (Ok(linked), true) = (&result, output_mode.is_human()) {
        success(&format!("{} Statement #{} cites {} pieces of evidence", Icons::LINK, statement, linked.len()));
    }
    let payload = result.map(|linked| {
        json!({ "statement": statement, "evidence": linked.iter().map(|e| e.id).collect::<Vec<_>>() })
    });
    emit_outcome(output_mode, "link-evidence", &Outcome::from_result(payload))
}

pub fn run_link_statements(
    store: &mut SqliteStore,
    output_mode: OutputMode,
    document: i64,
    statements: &[i64],
) -> anyhow::Result<bool> {
    let result = store
        .set_document_statements(document, statements)
        .and_then(|()| store.document_statements(document));
    if let (Ok(ordered), true) = (&result, output_mode.is_human()) {
        success(&format!("{} Document #{} has {} statements", Icons::LINK, document, ordered.len()));
    }
    let payload = result.map(|ordered| {
        json!({ "document": document, "statements": ordered.iter().map(|s| s.id).collect::<Vec<_>>() })
    });
    emit_outcome(output_mode, "link-statements", &Outcome::from_result(payload))
}

pub fn run_tag_evidence(
    store: &mut SqliteStore,
    output_mode: OutputMode,
    evidence: i64,
    tags: &[String],
) -> anyhow::Result<bool> {
    let names: Vec<&str> = tags.iter().map(String::as_str).collect();
    let result = store.set_evidence_tags(evidence, &names);
    if let (Ok(tagged), true) = (&result, output_mode.is_human()) {
        let list = tagged.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ");
        success(&format!("{} Evidence #{} tagged: {}", Icons::TAG, evidence, list));
    }
    let payload = result.map(|tagged| {
        json!({ "evidence": evidence, "tags": tagged.iter().map(|t| &t.name).collect::<Vec<_>>() })
    });
    emit_outcome(output_mode, "tag-evidence", &Outcome::from_result(payload))
}

/// Use `file` when given, otherwise ask for a path on stdin.
///
/// An empty answer means the user backed out.
fn choose_file(file: Option<PathBuf>, output_mode: OutputMode, prompt: &str) -> anyhow::Result<Option<PathBuf>> {
    if let Some(file) = file {
        return Ok(Some(file));
    }

    if output_mode.is_human() {
        eprint!("{} {}: ", Icons::FILE, prompt);
        std::io::stderr().flush()?;
    }
    Ok(read_file_answer(std::io::stdin().lock())?)
}

/// First line of `reader` as a path; blank or missing means no file
fn read_file_answer(mut reader: impl BufRead) -> std::io::Result<Option<PathBuf>> {
    let mut answer = String::new();
    reader.read_line(&mut answer)?;
    let answer = answer.trim();
    Ok((!answer.is_empty()).then(|| PathBuf::from(answer)))
}

fn report_json(path: &Path, report: &RemapReport) -> serde_json::Value {
    json!({
        "path": path,
        "imported": counts_json(&report.inserted),
        "dropped": report.dropped,
        "detached": report.detached,
    })
}

fn total(counts: &BTreeMap<Table, usize>) -> usize {
    counts.values().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_blank_answers_cancel() {
        for input in ["", "\n", "   \n", "\t \r\n", "  "] {
            assert_eq!(read_file_answer(Cursor::new(input)).unwrap(), None, "input {:?}", input);
        }
    }

    #[test]
    fn test_answer_is_first_line_trimmed() {
        let answer = read_file_answer(Cursor::new("  backups/kb.json \nignored\n")).unwrap();
        assert_eq!(answer, Some(PathBuf::from("backups/kb.json")));

        let answer = read_file_answer(Cursor::new("essay.json")).unwrap();
        assert_eq!(answer, Some(PathBuf::from("essay.json")));
    }

    #[test]
    fn test_given_file_skips_prompt() {
        let chosen = choose_file(Some(PathBuf::from("kb.json")), OutputMode::Json, "Backup file").unwrap();
        assert_eq!(chosen, Some(PathBuf::from("kb.json")));
    }
}
