use super::series::{RawSeries, SeriesPoint};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;

/// Soybean oil yield per unit of crushed soybeans.
pub const OIL_RATE: f64 = 0.185;
/// Soybean meal yield per unit of crushed soybeans.
pub const MEAL_RATE: f64 = 0.785;
/// Processing cost per tonne crushed.
pub const CRUSH_COST: f64 = 150.0;

#[derive(Error, Debug, PartialEq)]
pub enum ProcessingError {
    #[error("{series} series is missing field '{field}' on {date}")]
    MissingField {
        series: &'static str,
        field: &'static str,
        date: NaiveDate,
    },
}

/// Prices for one date on which all three sources reported.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub date: NaiveDate,
    pub soybean_oil_price: f64,
    pub oil_basis: f64,
    pub soybean_meal_price: f64,
    pub meal_basis: f64,
    pub soybean_no2_price: f64,
}

/// A merged row plus its crush metrics.
///
/// # Fields
/// * `spot_oil` / `spot_meal`: futures price adjusted by basis
/// * `gross_margin`: crush margin on spot prices
/// * `futures_margin`: crush margin on futures prices alone
/// * `oil_meal_ratio`: spot oil over spot meal; `None` when spot meal is zero
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRow {
    pub date: NaiveDate,
    pub soybean_oil_price: f64,
    pub oil_basis: f64,
    pub soybean_meal_price: f64,
    pub meal_basis: f64,
    pub soybean_no2_price: f64,
    pub spot_oil: f64,
    pub spot_meal: f64,
    pub gross_margin: f64,
    pub futures_margin: f64,
    pub oil_meal_ratio: Option<f64>,
}

impl DerivedRow {
    pub fn derive(row: MergedRow) -> Self {
        let spot_oil = row.soybean_oil_price + row.oil_basis;
        let spot_meal = row.soybean_meal_price + row.meal_basis;
        let input_cost = row.soybean_no2_price + CRUSH_COST;

        Self {
            date: row.date,
            soybean_oil_price: row.soybean_oil_price,
            oil_basis: row.oil_basis,
            soybean_meal_price: row.soybean_meal_price,
            meal_basis: row.meal_basis,
            soybean_no2_price: row.soybean_no2_price,
            spot_oil,
            spot_meal,
            gross_margin: spot_oil * OIL_RATE + spot_meal * MEAL_RATE - input_cost,
            futures_margin: row.soybean_oil_price * OIL_RATE
                + row.soybean_meal_price * MEAL_RATE
                - input_cost,
            oil_meal_ratio: (spot_meal != 0.0).then(|| spot_oil / spot_meal),
        }
    }

    /// Oil basis as a percentage of the oil futures price.
    pub fn oil_basis_rate(&self) -> Option<f64> {
        (self.soybean_oil_price != 0.0).then(|| self.oil_basis / self.soybean_oil_price * 100.0)
    }
}

/// Indexes a series by date. A later point for the same date replaces an earlier one.
fn by_date(series: &RawSeries) -> BTreeMap<NaiveDate, &SeriesPoint> {
    series.points().iter().map(|p| (p.date, p)).collect()
}

fn require(
    point: &SeriesPoint,
    series: &'static str,
    field: &'static str,
) -> Result<f64, ProcessingError> {
    point.field(field).ok_or(ProcessingError::MissingField {
        series,
        field,
        date: point.date,
    })
}

/// Inner-joins the three series on date and derives the crush metrics.
///
/// A date survives only when every series has it. Output is ascending by date.
///
/// # Arguments
/// * `oil`: soybean oil basis series (`price`, `basis`)
/// * `meal`: soybean meal basis series (`price`, `basis`)
/// * `bean`: soybean No.2 k-line series (`close`)
///
/// # Errors
/// Returns `ProcessingError::MissingField` if a joined point lacks a required field
pub fn merge(
    oil: &RawSeries,
    meal: &RawSeries,
    bean: &RawSeries,
) -> Result<Vec<DerivedRow>, ProcessingError> {
    let meal = by_date(meal);
    let bean = by_date(bean);

    by_date(oil)
        .into_iter()
        .filter_map(|(date, oil)| Some((oil, *meal.get(&date)?, *bean.get(&date)?)))
        .map(|(oil, meal, bean)| {
            let merged = MergedRow {
                date: oil.date,
                soybean_oil_price: require(oil, "soybean oil", "price")?,
                oil_basis: require(oil, "soybean oil", "basis")?,
                soybean_meal_price: require(meal, "soybean meal", "price")?,
                meal_basis: require(meal, "soybean meal", "basis")?,
                soybean_no2_price: require(bean, "soybean no.2", "close")?,
            };
            Ok(DerivedRow::derive(merged))
        })
        .collect()
}
