use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Taille du pool Mega-Sena (numéros 1 à 60).
pub const POOL_SIZE: u8 = 60;

/// Numéros tirés par concours.
pub const PICK_COUNT: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub sequence_id: u32,
    pub date: NaiveDate,
    /// Toujours triés par ordre croissant.
    pub numbers: [u8; PICK_COUNT],
}

impl Draw {
    pub fn new(sequence_id: u32, date: NaiveDate, mut numbers: [u8; PICK_COUNT]) -> Result<Self> {
        validate_numbers(&numbers)?;
        numbers.sort_unstable();
        Ok(Self {
            sequence_id,
            date,
            numbers,
        })
    }

    pub fn contains(&self, number: u8) -> bool {
        self.numbers.contains(&number)
    }
}

pub fn validate_numbers(numbers: &[u8; PICK_COUNT]) -> Result<()> {
    for &n in numbers {
        if n < 1 || n > POOL_SIZE {
            bail!("Numéro {} hors limites (1-{})", n, POOL_SIZE);
        }
    }
    for i in 0..numbers.len() {
        for j in (i + 1)..numbers.len() {
            if numbers[i] == numbers[j] {
                bail!("Numéro en double : {}", numbers[i]);
            }
        }
    }
    Ok(())
}

pub fn format_numbers(numbers: &[u8]) -> String {
    numbers
        .iter()
        .map(|n| format!("{:02}", n))
        .collect::<Vec<_>>()
        .join(" - ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()
    }

    #[test]
    fn test_validate_numbers_ok() {
        assert!(validate_numbers(&[1, 2, 3, 4, 5, 6]).is_ok());
        assert!(validate_numbers(&[60, 59, 58, 57, 56, 55]).is_ok());
    }

    #[test]
    fn test_validate_numbers_out_of_range() {
        assert!(validate_numbers(&[0, 2, 3, 4, 5, 6]).is_err());
        assert!(validate_numbers(&[1, 2, 3, 4, 5, 61]).is_err());
    }

    #[test]
    fn test_validate_numbers_duplicate() {
        assert!(validate_numbers(&[1, 1, 3, 4, 5, 6]).is_err());
        assert!(validate_numbers(&[7, 2, 3, 4, 5, 7]).is_err());
    }

    #[test]
    fn test_draw_new_sorts_numbers() {
        let draw = Draw::new(1, date(), [42, 5, 17, 60, 1, 33]).unwrap();
        assert_eq!(draw.numbers, [1, 5, 17, 33, 42, 60]);
        assert!(draw.contains(17));
        assert!(!draw.contains(18));
    }

    #[test]
    fn test_draw_new_rejects_invalid() {
        assert!(Draw::new(1, date(), [1, 2, 3, 4, 5, 5]).is_err());
    }

    #[test]
    fn test_format_numbers() {
        assert_eq!(format_numbers(&[1, 12, 60]), "01 - 12 - 60");
    }
}
