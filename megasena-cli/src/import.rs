use anyhow::{Context, Result};
use chrono::NaiveDate;
use megasena_db::rusqlite::Connection;
use std::path::Path;

use megasena_db::db::insert_draw;
use megasena_db::models::{Draw, PICK_COUNT};

/// Colonnes attendues : `Concurso;Data Sorteio;Bola1;...;Bola6`, en-tête inclus.
fn parse_record(record: &csv::StringRecord) -> Result<Draw> {
    let get = |idx: usize| -> Result<String> {
        record
            .get(idx)
            .map(|s| s.trim().to_string())
            .with_context(|| format!("Champ manquant à l'index {}", idx))
    };

    let raw_id = get(0)?;
    let sequence_id: u32 = raw_id
        .parse()
        .with_context(|| format!("Numéro de concours invalide : '{}'", raw_id))?;
    let date = parse_date(&get(1)?)?;

    let mut numbers = [0u8; PICK_COUNT];
    for (i, slot) in numbers.iter_mut().enumerate() {
        let s = get(2 + i)?;
        *slot = s
            .parse::<u8>()
            .with_context(|| format!("Impossible de parser '{}' (index {})", s, 2 + i))?;
    }

    Draw::new(sequence_id, date, numbers)
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .with_context(|| format!("Format de date invalide: '{}'", raw))
}

pub struct ImportResult {
    pub total_records: u32,
    pub inserted: u32,
    pub skipped: u32,
    pub errors: u32,
}

pub fn import_csv(conn: &Connection, path: &Path) -> Result<ImportResult> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;

    let tx = conn
        .unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;

    let mut result = ImportResult {
        total_records: 0,
        inserted: 0,
        skipped: 0,
        errors: 0,
    };

    for record_result in reader.records() {
        result.total_records += 1;
        let draw = record_result
            .context("Erreur de lecture")
            .and_then(|record| parse_record(&record));
        match draw {
            Ok(draw) => match insert_draw(&tx, &draw) {
                Ok(true) => result.inserted += 1,
                Ok(false) => result.skipped += 1,
                Err(e) => {
                    eprintln!("Erreur insertion concours {}: {:#}", draw.sequence_id, e);
                    result.errors += 1;
                }
            },
            Err(e) => {
                eprintln!("Erreur ligne {}: {:#}", result.total_records, e);
                result.errors += 1;
            }
        }
    }

    tx.commit().context("Échec du commit")?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use megasena_db::db::{count_draws, fetch_history, migrate};

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("11/03/1996").unwrap(),
            NaiveDate::from_ymd_opt(1996, 3, 11).unwrap()
        );
        assert_eq!(
            parse_date("2024-01-02").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert!(parse_date("31/02/2020").is_err());
    }

    #[test]
    fn test_parse_record_sorts_numbers() {
        let record = csv::StringRecord::from(vec!["1", "11/03/1996", "41", "5", "4", "52", "30", "33"]);
        let draw = parse_record(&record).unwrap();
        assert_eq!(draw.sequence_id, 1);
        assert_eq!(draw.numbers, [4, 5, 30, 33, 41, 52]);
    }

    #[test]
    fn test_parse_record_rejects_invalid() {
        let dup = csv::StringRecord::from(vec!["2", "18/03/1996", "9", "9", "15", "23", "39", "40"]);
        assert!(parse_record(&dup).is_err());
        let short = csv::StringRecord::from(vec!["3", "25/03/1996", "1", "2"]);
        assert!(parse_record(&short).is_err());
        let range = csv::StringRecord::from(vec!["4", "01/04/1996", "1", "2", "3", "4", "5", "61"]);
        assert!(parse_record(&range).is_err());
    }

    #[test]
    fn test_import_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("megasena.csv");
        std::fs::write(
            &path,
            "Concurso;Data Sorteio;Bola1;Bola2;Bola3;Bola4;Bola5;Bola6\n\
             1;11/03/1996;41;5;4;52;30;33\n\
             2;18/03/1996;9;39;37;49;43;41\n\
             2;18/03/1996;9;39;37;49;43;41\n\
             3;25/03/1996;x;1;2;3;4;5\n",
        )
        .unwrap();

        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let result = import_csv(&conn, &path).unwrap();
        assert_eq!(result.total_records, 4);
        assert_eq!(result.inserted, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.errors, 1);
        assert_eq!(count_draws(&conn).unwrap(), 2);
        assert_eq!(fetch_history(&conn).unwrap()[1].numbers, [9, 37, 39, 41, 43, 49]);
    }
}
