//! Product popularity, conversion and ranking.
//!
//! `popularity = sales * 0.4 + (unique_views / 100) * 0.3 + (1 / (days_since_last_sale + 1)) * 0.3`
//!
//! Days since the last sale are fractional; a product that never sold counts as 30 days.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use socialmart_core::{Money, Platform, Product, ProductId, ProductStatus};

/// Weight of the sales count
pub const SALES_WEIGHT: f64 = 0.4;
/// Weight of the unique-view signal
pub const VIEWS_WEIGHT: f64 = 0.3;
/// Weight of the recency signal
pub const RECENCY_WEIGHT: f64 = 0.3;
/// Days since last sale assumed for products that never sold
pub const NEVER_SOLD_DAYS: f64 = 30.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Fractional days between the last sale and `now`, never negative.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn days_since_last_sale(last_sale_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    last_sale_at.map_or(NEVER_SOLD_DAYS, |at| {
        ((now - at).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0)
    })
}

/// Weighted popularity score from raw signals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn popularity_score(sales_count: u64, unique_views: u64, days_since_sale: f64) -> f64 {
    let sales = sales_count as f64 * SALES_WEIGHT;
    let views = (unique_views as f64 / 100.0) * VIEWS_WEIGHT;
    let recency = (1.0 / (days_since_sale.max(0.0) + 1.0)) * RECENCY_WEIGHT;
    sales + views + recency
}

/// Popularity of a product snapshot at `now`.
#[must_use]
pub fn popularity(product: &Product, now: DateTime<Utc>) -> f64 {
    popularity_score(
        product.sales.count,
        product.views.unique,
        days_since_last_sale(product.sales.last_sale_at, now),
    )
}

/// `sales / unique_views * 100`, or `0` without unique views.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn conversion_rate(sales_count: u64, unique_views: u64) -> f64 {
    if unique_views == 0 {
        return 0.0;
    }
    sales_count as f64 / unique_views as f64 * 100.0
}

/// Revenue per sale, or the listed price before the first sale.
#[must_use]
pub fn average_sale_price(product: &Product) -> Money {
    product.sales.total_revenue.checked_div(product.sales.count).unwrap_or(product.price)
}

/// Derived figures of one product, as shown on dashboards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductPerformance {
    /// Product
    pub product_id: ProductId,
    /// Listed handle
    pub username: String,
    /// Platform
    pub platform: Platform,
    /// Listing status
    pub status: ProductStatus,
    /// Listed price
    pub price: Money,
    /// Settled sales
    pub sales_count: u64,
    /// Settled revenue
    pub total_revenue: Money,
    /// Stored popularity score
    pub popularity: f64,
    /// Percentage of unique viewers who bought
    pub conversion_rate: f64,
    /// Revenue per sale
    pub average_sale_price: Money,
}

impl From<&Product> for ProductPerformance {
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.id,
            username: product.username.clone(),
            platform: product.platform,
            status: product.status,
            price: product.price,
            sales_count: product.sales.count,
            total_revenue: product.sales.total_revenue,
            popularity: product.popularity,
            conversion_rate: conversion_rate(product.sales.count, product.views.unique),
            average_sale_price: average_sale_price(product),
        }
    }
}

/// Whether a product may appear in the popular-products ranking.
#[must_use]
pub fn is_rankable(product: &Product) -> bool {
    matches!(product.status, ProductStatus::Available | ProductStatus::Sold) && product.sales.count > 0
}

/// The `limit` most popular eligible products.
///
/// Ordered by popularity, then sales count, then revenue, all descending.
#[must_use]
pub fn rank_popular(products: &[Product], limit: usize) -> Vec<ProductPerformance> {
    let mut eligible: Vec<&Product> = products.iter().filter(|p| is_rankable(p)).collect();
    eligible.sort_by(|a, b| {
        b.popularity
            .total_cmp(&a.popularity)
            .then_with(|| b.sales.count.cmp(&a.sales.count))
            .then_with(|| b.sales.total_revenue.cmp(&a.sales.total_revenue))
    });
    eligible.into_iter().take(limit).map(ProductPerformance::from).collect()
}
