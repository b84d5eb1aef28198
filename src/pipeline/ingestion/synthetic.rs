use std::path::Path;

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::error::Result;

/// Well-formed code pools the generator draws from.
const ICD_CODES: [&str; 12] = [
    "A00.0", "B20", "C34.90", "D50.9", "E11.9", "F32.9", "I10", "J06.9", "K21.0", "M54.5",
    "N39.0", "R10.9",
];
const CPT_CODES: [&str; 10] = [
    "99213", "99214", "99215", "99203", "99204", "36415", "80053", "85025", "93000", "97110",
];
const STATUSES: [&str; 4] = ["PAID", "DENIED", "PENDING", "APPEALED"];

const BAD_DATES: [&str; 5] = ["2024/13/45", "not-a-date", "31-02-2024", "2024-00-15", ""];
const BAD_ICDS: [&str; 5] = ["INVALID", "123", "ZZZ.ZZ", "A", "12345678"];
const BAD_CPTS: [&str; 5] = ["XXXXX", "123", "ABCDE", "0", "999999"];

/// Generate a seeded synthetic claims CSV with injected anomalies:
/// duplicates, missing mandatory fields, malformed dates and codes, extreme
/// outlier amounts, and negative amounts. Deterministic for a given
/// (count, seed) so demo runs are reproducible.
pub fn generate_claims_csv(path: &Path, count: usize, seed: u64) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);

    let providers: Vec<String> = (1..=50).map(|i| format!("PRV{:05}", i)).collect();
    let members: Vec<String> = (1..=500).map(|i| format!("MBR{:06}", i)).collect();
    let window_start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let window_days = 730;

    let mut rows: Vec<Vec<String>> = (1..=count)
        .map(|i| {
            let service_date = window_start + Duration::days(rng.gen_range(0..window_days));
            vec![
                format!("CLM{:08}", i),
                members.choose(&mut rng).unwrap().clone(),
                providers.choose(&mut rng).unwrap().clone(),
                format!("{:.2}", rng.gen_range(40.0..2500.0)),
                service_date.format("%Y-%m-%d").to_string(),
                ICD_CODES.choose(&mut rng).unwrap().to_string(),
                CPT_CODES.choose(&mut rng).unwrap().to_string(),
                STATUSES.choose(&mut rng).unwrap().to_string(),
            ]
        })
        .collect();

    // Duplicate ~2% of claims wholesale.
    for _ in 0..count.max(50) / 50 {
        let row = rows[rng.gen_range(0..rows.len())].clone();
        rows.push(row);
    }

    let total = rows.len();
    let corrupt = |rng: &mut StdRng, share: f64| -> Vec<usize> {
        let n = ((total as f64) * share).round() as usize;
        (0..n).map(|_| rng.gen_range(0..total)).collect()
    };

    // Missing mandatory fields (~3%), spread across columns.
    for col in [1usize, 2, 3, 5] {
        for idx in corrupt(&mut rng, 0.03 / 4.0) {
            rows[idx][col] = String::new();
        }
    }
    // Malformed dates (~1%).
    for idx in corrupt(&mut rng, 0.01) {
        rows[idx][4] = BAD_DATES.choose(&mut rng).unwrap().to_string();
    }
    // Extreme outlier amounts (~1%).
    for idx in corrupt(&mut rng, 0.01) {
        rows[idx][3] = format!("{:.2}", rng.gen_range(50_000.0..500_000.0));
    }
    // Malformed codes (~2% each).
    for idx in corrupt(&mut rng, 0.02) {
        rows[idx][5] = BAD_ICDS.choose(&mut rng).unwrap().to_string();
    }
    for idx in corrupt(&mut rng, 0.02) {
        rows[idx][6] = BAD_CPTS.choose(&mut rng).unwrap().to_string();
    }
    // Negative amounts (~0.5%).
    for idx in corrupt(&mut rng, 0.005) {
        rows[idx][3] = format!("-{:.2}", rng.gen_range(10.0..1000.0));
    }

    rows.shuffle(&mut rng);

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(super::EXPECTED_COLUMNS)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = total, "generated synthetic claims");
    Ok(())
}
