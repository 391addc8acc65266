use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::path::Path;

use crate::models::Draw;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS draws (
    sequence_id   INTEGER PRIMARY KEY,
    date          TEXT NOT NULL,
    ball_1        INTEGER NOT NULL,
    ball_2        INTEGER NOT NULL,
    ball_3        INTEGER NOT NULL,
    ball_4        INTEGER NOT NULL,
    ball_5        INTEGER NOT NULL,
    ball_6        INTEGER NOT NULL
);
";

const SELECT_COLUMNS: &str =
    "SELECT sequence_id, date, ball_1, ball_2, ball_3, ball_4, ball_5, ball_6 FROM draws";

pub fn db_path() -> std::path::PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("megasena.db");
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Impossible de créer le répertoire {:?}", parent))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Impossible d'ouvrir la base {:?}", path))?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA).context("Échec de la migration")?;
    Ok(())
}

pub fn insert_draw(conn: &Connection, draw: &Draw) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO draws (sequence_id, date, ball_1, ball_2, ball_3, ball_4, ball_5, ball_6)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                draw.sequence_id,
                draw.date,
                draw.numbers[0],
                draw.numbers[1],
                draw.numbers[2],
                draw.numbers[3],
                draw.numbers[4],
                draw.numbers[5],
            ],
        )
        .context("Échec de l'insertion")?;
    Ok(changed > 0)
}

fn row_to_draw(row: &rusqlite::Row<'_>) -> rusqlite::Result<(u32, NaiveDate, [u8; 6])> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        [
            row.get::<_, u8>(2)?,
            row.get::<_, u8>(3)?,
            row.get::<_, u8>(4)?,
            row.get::<_, u8>(5)?,
            row.get::<_, u8>(6)?,
            row.get::<_, u8>(7)?,
        ],
    ))
}

fn collect_draws(rows: Vec<(u32, NaiveDate, [u8; 6])>) -> Result<Vec<Draw>> {
    rows.into_iter()
        .map(|(id, date, numbers)| {
            Draw::new(id, date, numbers).with_context(|| format!("Concours {} invalide en base", id))
        })
        .collect()
}

/// Historique complet, du plus ancien au plus récent.
pub fn fetch_history(conn: &Connection) -> Result<Vec<Draw>> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY sequence_id ASC"))?;
    let rows = stmt
        .query_map([], row_to_draw)?
        .collect::<Result<Vec<_>, _>>()?;
    collect_draws(rows)
}

/// Les `limit` derniers tirages, le plus récent en premier.
pub fn fetch_last_draws(conn: &Connection, limit: u32) -> Result<Vec<Draw>> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY sequence_id DESC LIMIT ?1"))?;
    let rows = stmt
        .query_map([limit], row_to_draw)?
        .collect::<Result<Vec<_>, _>>()?;
    collect_draws(rows)
}

pub fn count_draws(conn: &Connection) -> Result<u32> {
    let count: u32 = conn.query_row("SELECT COUNT(*) FROM draws", [], |row| row.get(0))?;
    Ok(count)
}
