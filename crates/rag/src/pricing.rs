use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::Local;
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use boq_core::{
    normalize_material_name, parse_amount, read_table_path, CostLine, PriceEntry, Quantity, Table,
};

pub const MATERIAL_COLUMN: &str = "Raw Material";
pub const UNIT_PRICE_COLUMN: &str = "Unit Price";
pub const DISCOUNT_COLUMN: &str = "Discount";
pub const GRAND_TOTAL_LABEL: &str = "GRAND TOTAL";

const SUMMARY_HEADERS: [&str; 6] = [
    "Raw Material",
    "Quantity",
    "Unit Price",
    "Discount (%)",
    "Total",
    "Matched",
];

static SUMMARY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Price list keyed by normalized material name; the first row for a name wins.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    entries: Vec<PriceEntry>,
    by_name: HashMap<String, usize>,
}

impl PriceTable {
    pub fn new(entries: Vec<PriceEntry>) -> Self {
        let mut by_name = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            by_name
                .entry(normalize_material_name(&entry.material))
                .or_insert(idx);
        }
        Self { entries, by_name }
    }

    pub fn from_table(table: &Table) -> boq_core::Result<Self> {
        let material_col = table.require_column(MATERIAL_COLUMN)?;
        let price_col = table.require_column(UNIT_PRICE_COLUMN)?;
        let discount_col = table.column_index(DISCOUNT_COLUMN);
        let entries = (0..table.len())
            .filter(|row| !table.cell(*row, material_col).trim().is_empty())
            .map(|row| {
                let material = table.cell(row, material_col).to_string();
                let unit_price = amount_or_zero(table.cell(row, price_col), &material, "price");
                let discount_percent = discount_col
                    .map(|col| table.cell(row, col))
                    .filter(|raw| !raw.trim().is_empty())
                    .map(|raw| amount_or_zero(raw, &material, "discount"))
                    .unwrap_or(0.0);
                PriceEntry {
                    material,
                    unit_price,
                    discount_percent,
                }
            })
            .collect();
        Ok(Self::new(entries))
    }

    pub fn load(path: &Path) -> boq_core::Result<Self> {
        Self::from_table(&read_table_path(path)?)
    }

    pub fn lookup(&self, material: &str) -> Option<&PriceEntry> {
        self.by_name
            .get(&normalize_material_name(material))
            .map(|idx| &self.entries[*idx])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn amount_or_zero(raw: &str, material: &str, field: &str) -> f64 {
    parse_amount(raw).unwrap_or_else(|| {
        warn!(material, field, value = raw, "unparseable amount, defaulting to 0");
        0.0
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialQuery {
    pub material: String,
    pub quantity: Quantity,
}

impl MaterialQuery {
    pub fn new(material: impl Into<String>, quantity: impl Into<Quantity>) -> Self {
        Self {
            material: material.into(),
            quantity: quantity.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostSummary {
    pub lines: Vec<CostLine>,
    pub grand_total: f64,
}

impl CostSummary {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &CostLine> {
        self.lines.iter().filter(|line| !line.matched)
    }

    /// Material lines followed by the synthetic grand-total row.
    pub fn rows(&self) -> Vec<CostLine> {
        let mut rows = self.lines.clone();
        rows.push(CostLine {
            material: GRAND_TOTAL_LABEL.to_string(),
            quantity: 0.0,
            unit_price: 0.0,
            discount_percent: 0.0,
            total: self.grand_total,
            matched: false,
        });
        rows
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn line_total(quantity: f64, unit_price: f64, discount_percent: f64) -> f64 {
    round2(quantity * unit_price * (1.0 - discount_percent / 100.0))
}

/// Prices every query in order. Unmatched materials stay in the summary at zero cost.
pub fn compute_costs(queries: &[MaterialQuery], prices: &PriceTable) -> CostSummary {
    let lines: Vec<CostLine> = queries
        .iter()
        .map(|query| {
            let quantity = query.quantity.value_or_zero(&query.material);
            match prices.lookup(&query.material) {
                Some(entry) => CostLine {
                    material: entry.material.clone(),
                    quantity,
                    unit_price: entry.unit_price,
                    discount_percent: entry.discount_percent,
                    total: line_total(quantity, entry.unit_price, entry.discount_percent),
                    matched: true,
                },
                None => {
                    debug!(material = %query.material, "no price match");
                    CostLine {
                        material: query.material.clone(),
                        quantity,
                        unit_price: 0.0,
                        discount_percent: 0.0,
                        total: 0.0,
                        matched: false,
                    }
                }
            }
        })
        .collect();
    let grand_total = round2(lines.iter().map(|line| line.total).sum());
    CostSummary { lines, grand_total }
}

/// Prices against the price file on disk and persists timestamped summaries.
#[derive(Debug, Clone)]
pub struct CostCalculator {
    price_file: PathBuf,
    output_dir: PathBuf,
}

impl CostCalculator {
    pub fn new(price_file: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            price_file: price_file.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn price_file(&self) -> &Path {
        &self.price_file
    }

    /// A missing or malformed price file yields an empty summary, never an error.
    pub fn compute(&self, queries: &[MaterialQuery]) -> CostSummary {
        if !self.price_file.exists() {
            error!(path = %self.price_file.display(), "price file not found");
            return CostSummary::default();
        }
        match PriceTable::load(&self.price_file) {
            Ok(prices) => compute_costs(queries, &prices),
            Err(err) => {
                error!(path = %self.price_file.display(), error = %err, "failed to load price file");
                CostSummary::default()
            }
        }
    }

    pub fn write_summary(&self, summary: &CostSummary) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("failed to create output dir {}", self.output_dir.display())
        })?;
        let path = self.next_summary_path();
        write_summary_xlsx(summary, &path)?;
        info!(path = %path.display(), lines = summary.lines.len(), grand_total = summary.grand_total, "cost summary written");
        Ok(path)
    }

    fn next_summary_path(&self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f");
        loop {
            let seq = SUMMARY_SEQ.fetch_add(1, Ordering::Relaxed);
            let candidate = self
                .output_dir
                .join(format!("cost_summary_{stamp}_{seq}.xlsx"));
            if !candidate.exists() {
                return candidate;
            }
        }
    }
}

fn write_summary_xlsx(summary: &CostSummary, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Cost Summary")?;
    let bold = Format::new().set_bold();
    let money = Format::new().set_num_format("#,##0.00");
    for (col, header) in SUMMARY_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }
    let rows = summary.rows();
    let last = rows.len().saturating_sub(1);
    for (idx, line) in rows.iter().enumerate() {
        let row = (idx + 1) as u32;
        if idx == last {
            worksheet.write_string_with_format(row, 0, &line.material, &bold)?;
            worksheet.write_number_with_format(row, 4, line.total, &money)?;
            continue;
        }
        worksheet.write_string(row, 0, &line.material)?;
        worksheet.write_number(row, 1, line.quantity)?;
        worksheet.write_number_with_format(row, 2, line.unit_price, &money)?;
        worksheet.write_number(row, 3, line.discount_percent)?;
        worksheet.write_number_with_format(row, 4, line.total, &money)?;
        worksheet.write_string(row, 5, if line.matched { "yes" } else { "no" })?;
    }
    worksheet.set_column_width(0, 32)?;
    workbook
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boq_core::read_table;
    use proptest::prelude::*;

    fn prices() -> PriceTable {
        PriceTable::new(vec![
            PriceEntry {
                material: "Copper Wire".into(),
                unit_price: 2.0,
                discount_percent: 0.0,
            },
            PriceEntry {
                material: "Switch".into(),
                unit_price: 4.5,
                discount_percent: 10.0,
            },
            PriceEntry {
                material: "copper wire".into(),
                unit_price: 99.0,
                discount_percent: 0.0,
            },
        ])
    }

    #[test]
    fn lookup_trims_and_ignores_case_only() {
        let table = prices();
        assert_eq!(table.lookup(" Copper Wire ").unwrap().unit_price, 2.0);
        assert_eq!(table.lookup("copper wire").unwrap().unit_price, 2.0);
        assert!(table.lookup("Copper  Wire").is_none());
        assert!(table.lookup("copper").is_none());
    }

    #[test]
    fn applies_discount_and_rounds() {
        let summary = compute_costs(&[MaterialQuery::new("switch", 3.0)], &prices());
        assert_eq!(summary.lines[0].total, 12.15);
        assert_eq!(summary.lines[0].material, "Switch");
        assert!(summary.lines[0].matched);
    }

    #[test]
    fn unmatched_material_is_kept_at_zero() {
        let summary = compute_costs(
            &[
                MaterialQuery::new("copper wire", 10.0),
                MaterialQuery::new("unobtainium", 4.0),
            ],
            &prices(),
        );
        assert_eq!(summary.lines.len(), 2);
        assert_eq!(summary.lines[1].material, "unobtainium");
        assert_eq!(summary.lines[1].total, 0.0);
        assert_eq!(summary.grand_total, 20.0);
        assert_eq!(summary.unmatched().count(), 1);
    }

    #[test]
    fn blank_quantity_counts_as_zero() {
        let summary = compute_costs(
            &[MaterialQuery::new("copper wire", Quantity::blank())],
            &prices(),
        );
        assert_eq!(summary.lines[0].quantity, 0.0);
        assert_eq!(summary.grand_total, 0.0);
    }

    #[test]
    fn rows_end_with_grand_total() {
        let summary = compute_costs(&[MaterialQuery::new("copper wire", 1.5)], &prices());
        let rows = summary.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].material, GRAND_TOTAL_LABEL);
        assert_eq!(rows[1].total, 3.0);
    }

    #[test]
    fn price_sheet_requires_named_columns() {
        let table = read_table("prices.csv", b"Material,Price\nwire,2\n").unwrap();
        let err = PriceTable::from_table(&table).unwrap_err();
        assert!(matches!(err, boq_core::BoqError::MissingColumn(ref c) if c == MATERIAL_COLUMN));
    }

    #[test]
    fn discount_column_is_optional() {
        let table =
            read_table("prices.csv", b"Raw Material,Unit Price\nCopper Wire,$2.00\n").unwrap();
        let prices = PriceTable::from_table(&table).unwrap();
        let entry = prices.lookup("copper wire").unwrap();
        assert_eq!(entry.unit_price, 2.0);
        assert_eq!(entry.discount_percent, 0.0);
    }

    #[test]
    fn missing_price_file_gives_empty_summary() {
        let dir = tempfile::tempdir().unwrap();
        let calculator = CostCalculator::new(dir.path().join("nope.xlsx"), dir.path());
        let summary = calculator.compute(&[MaterialQuery::new("copper wire", 1.0)]);
        assert!(summary.is_empty());
        assert_eq!(summary.grand_total, 0.0);
    }

    #[test]
    fn price_file_missing_columns_gives_empty_summary() {
        let dir = tempfile::tempdir().unwrap();
        let prices = dir.path().join("prices.csv");
        std::fs::write(&prices, "Raw Material,Cost
Copper Wire,2.00
").unwrap();
        let calculator = CostCalculator::new(&prices, dir.path());
        let summary = calculator.compute(&[MaterialQuery::new("copper wire", 10.0)]);
        assert!(summary.is_empty());
        assert_eq!(summary.grand_total, 0.0);
    }

    #[test]
    fn summaries_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let calculator = CostCalculator::new(dir.path().join("prices.csv"), dir.path());
        let summary = compute_costs(&[MaterialQuery::new("copper wire", 2.0)], &prices());
        let first = calculator.write_summary(&summary).unwrap();
        let second = calculator.write_summary(&summary).unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
        let reread = boq_core::read_table_path(&first).unwrap();
        assert_eq!(reread.headers()[0], "Raw Material");
        assert_eq!(reread.cell(1, 0), GRAND_TOTAL_LABEL);
        assert_eq!(reread.cell(1, 4), "4");
    }

    proptest! {
        #[test]
        fn doubling_quantity_doubles_line_total(
            qty in 0u32..10_000,
            price_cents in 0u32..100_000,
            discount in 0u32..100,
        ) {
            let table = PriceTable::new(vec![PriceEntry {
                material: "Cable".into(),
                unit_price: price_cents as f64 / 100.0,
                discount_percent: discount as f64,
            }]);
            let single = compute_costs(&[MaterialQuery::new("cable", qty as f64)], &table);
            let double = compute_costs(&[MaterialQuery::new("cable", (qty * 2) as f64)], &table);
            prop_assert!((double.lines[0].total - 2.0 * single.lines[0].total).abs() <= 0.0101);
        }

        #[test]
        fn grand_total_is_rounded_sum_of_lines(quantities in prop::collection::vec(0u32..500, 1..8)) {
            let queries: Vec<MaterialQuery> = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| MaterialQuery::new(if i % 2 == 0 { "copper wire" } else { "switch" }, *q as f64))
                .collect();
            let summary = compute_costs(&queries, &prices());
            let sum: f64 = summary.lines.iter().map(|line| line.total).sum();
            prop_assert_eq!(summary.grand_total, round2(sum));
        }
    }
}
