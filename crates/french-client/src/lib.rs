//! Kenneth French data library client for the monthly Fama-French research
//! factors (Mkt-RF, SMB, HML, RF).

use std::io::{Cursor, Read};

use analysis_core::{AnalysisError, FactorPanel, FactorProvider, FactorRow, MonthEnd};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{header, Client};

pub const DEFAULT_FACTORS_URL: &str =
    "https://mba.tuck.dartmouth.edu/pages/faculty/ken.french/ftp/F-F_Research_Data_Factors_CSV.zip";

/// Name reported in `DataUnavailable` errors for the factor dataset.
pub const DATASET_NAME: &str = "F-F_Research_Data_Factors";

const USER_AGENT: &str = "Mozilla/5.0 (compatible; expected-return-service)";

#[derive(Clone)]
pub struct FrenchLibraryClient {
    client: Client,
    url: String,
}

impl FrenchLibraryClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            url: DEFAULT_FACTORS_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Download the dataset and return its CSV text. Zip archives are unpacked
    /// in memory; plain CSV bodies are passed through.
    async fn download_csv(&self) -> Result<String, AnalysisError> {
        let response = self
            .client
            .get(&self.url)
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AnalysisError::ApiError(format!(
                "HTTP {} from factor library",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        if bytes.starts_with(b"PK") {
            unzip_first_file(&bytes)
        } else {
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

#[async_trait]
impl FactorProvider for FrenchLibraryClient {
    fn name(&self) -> &str {
        "french-library"
    }

    async fn fetch_factor_panel(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FactorPanel, AnalysisError> {
        let text = self.download_csv().await?;
        let rows = parse_monthly_factors(&text)?;
        tracing::debug!(rows = rows.len(), "Monthly factor rows parsed");

        let panel = FactorPanel::new(filter_range(rows, start, end));
        if panel.is_empty() {
            return Err(AnalysisError::data_unavailable(DATASET_NAME, start, end));
        }
        Ok(panel)
    }
}

fn unzip_first_file(bytes: &[u8]) -> Result<String, AnalysisError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AnalysisError::InvalidData(format!("factor archive: {}", e)))?;
    let mut file = archive
        .by_index(0)
        .map_err(|e| AnalysisError::InvalidData(format!("factor archive: {}", e)))?;

    let mut raw = Vec::new();
    file.read_to_end(&mut raw)
        .map_err(|e| AnalysisError::InvalidData(format!("factor archive: {}", e)))?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Keep months from `start`'s month through `end`'s month, inclusive.
pub fn filter_range(rows: Vec<FactorRow>, start: NaiveDate, end: NaiveDate) -> Vec<FactorRow> {
    let first = MonthEnd::containing(start);
    let last = MonthEnd::containing(end);
    rows.into_iter()
        .filter(|r| r.month >= first && r.month <= last)
        .collect()
}

/// Column positions taken from the `,Mkt-RF,SMB,HML,RF` header line.
struct Columns {
    mkt_rf: usize,
    smb: usize,
    hml: usize,
    rf: usize,
}

impl Columns {
    fn from_header(record: &csv::StringRecord) -> Option<Self> {
        let find = |name: &str| record.iter().position(|f| f.eq_ignore_ascii_case(name));
        Some(Self {
            mkt_rf: find("Mkt-RF")?,
            smb: find("SMB")?,
            hml: find("HML")?,
            rf: find("RF")?,
        })
    }
}

/// Parse the monthly block of the factor CSV.
///
/// Monthly rows are keyed `YYYYMM`; the annual block that follows uses `YYYY`
/// and is ignored. Values are percentages and are divided by 100. Rows holding
/// the library's missing-value markers (-99.99, -999) are skipped.
pub fn parse_monthly_factors(text: &str) -> Result<Vec<FactorRow>, AnalysisError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut columns: Option<Columns> = None;
    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result.map_err(|e| AnalysisError::InvalidData(format!("factor csv: {}", e)))?;
        let first = record.get(0).unwrap_or("");

        if first.to_ascii_lowercase().contains("annual") {
            break;
        }

        let Some(cols) = columns.as_ref() else {
            columns = Columns::from_header(&record);
            continue;
        };

        let Some(month) = parse_yyyymm(first) else {
            continue;
        };

        let value = |idx: usize| -> Option<f64> {
            let v: f64 = record.get(idx)?.parse().ok()?;
            if !v.is_finite() || v <= -99.99 {
                return None;
            }
            Some(v / 100.0)
        };

        match (value(cols.mkt_rf), value(cols.smb), value(cols.hml), value(cols.rf)) {
            (Some(mkt_rf), Some(smb), Some(hml), Some(rf)) => rows.push(FactorRow {
                month,
                mkt_rf,
                smb,
                hml,
                rf,
            }),
            _ => tracing::debug!(month = %month, "Skipping factor row with missing values"),
        }
    }

    if columns.is_none() {
        return Err(AnalysisError::InvalidData(
            "factor csv has no Mkt-RF,SMB,HML,RF header".to_string(),
        ));
    }
    Ok(rows)
}

fn parse_yyyymm(field: &str) -> Option<MonthEnd> {
    if field.len() != 6 || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = field[..4].parse().ok()?;
    let month: u32 = field[4..].parse().ok()?;
    MonthEnd::from_year_month(year, month)
}
