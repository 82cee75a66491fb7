//! Sales report: summary, top products, monthly sales and regions.

use super::series::{RegionalFigures, count_growth, money_growth, regional_breakdown, revenue};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use socialmart_core::{Money, Period, Platform, Product, ProductId, ProductStatus, Sale};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Products listed in the top-products section
pub const TOP_PRODUCTS: usize = 5;

const MONTH_LABELS: [&str; 12] =
    ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];

/// Headline figures of a sales report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Revenue in the period
    pub total_revenue: Money,
    /// Sales in the period
    pub total_transactions: u64,
    /// Distinct buyers in the period
    pub total_customers: u64,
    /// Mean sale amount, zero without sales
    pub average_transaction_value: Money,
    /// Listed products
    pub total_products: u64,
    /// Revenue growth against the previous period, in percent
    pub revenue_growth: f64,
    /// Growth of distinct buyers against the previous period, in percent
    pub customer_growth: f64,
    /// Growth of new listings against the previous period, in percent
    pub product_growth: f64,
}

/// A best-selling product of the period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopProduct {
    /// Product
    pub product_id: ProductId,
    /// Listed handle, if the product is still stored
    pub username: Option<String>,
    /// Platform at the time of sale
    pub platform: Platform,
    /// Current listing status, if the product is still stored
    pub status: Option<ProductStatus>,
    /// Listed price, if the product is still stored
    pub price: Option<Money>,
    /// Units sold in the period
    pub units: u64,
    /// Revenue in the period
    pub revenue: Money,
}

/// Sales of one calendar month.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlySales {
    /// Calendar year
    pub year: i32,
    /// Month label (`Jan` .. `Dec`)
    pub month: String,
    /// Revenue
    pub revenue: Money,
    /// Mean sale amount
    pub average_item_value: Money,
}

/// Sales report of a period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SalesReport {
    /// Reported period
    pub period: Period,
    /// Region filter applied to sales
    pub region: Option<String>,
    /// Headline figures
    pub summary: ReportSummary,
    /// Best-selling products by revenue
    pub top_products: Vec<TopProduct>,
    /// Revenue per calendar month, oldest first
    pub monthly_sales: Vec<MonthlySales>,
    /// Per-region revenue with growth
    pub regional_data: Vec<RegionalFigures>,
}

impl SalesReport {
    /// Build the report from sales of `period`, sales of the previous period and every
    /// stored product
    #[must_use]
    pub fn assemble(
        period: Period,
        region: Option<String>,
        sales: &[Sale],
        previous_sales: &[Sale],
        products: &[Product],
    ) -> Self {
        let total_revenue = revenue(sales);
        let total_transactions = sales.len() as u64;
        let customers = distinct_customers(sales);
        let previous_customers = distinct_customers(previous_sales);

        let listed_now = products.iter().filter(|p| period.contains(p.created_at)).count() as u64;
        let listed_before =
            products.iter().filter(|p| period.previous().contains(p.created_at)).count() as u64;

        let summary = ReportSummary {
            total_revenue,
            total_transactions,
            total_customers: customers,
            average_transaction_value: total_revenue.checked_div(total_transactions).unwrap_or_default(),
            total_products: products.len() as u64,
            revenue_growth: money_growth(total_revenue, revenue(previous_sales)),
            customer_growth: count_growth(customers, previous_customers),
            product_growth: count_growth(listed_now, listed_before),
        };

        Self {
            period,
            region,
            summary,
            top_products: top_products(sales, products, TOP_PRODUCTS),
            monthly_sales: monthly_sales(sales),
            regional_data: regional_breakdown(sales, previous_sales),
        }
    }
}

fn distinct_customers(sales: &[Sale]) -> u64 {
    sales.iter().map(|s| s.customer_id).collect::<HashSet<_>>().len() as u64
}

/// The `limit` products with the most revenue in `sales`, ties broken by units sold.
#[must_use]
pub fn top_products(sales: &[Sale], products: &[Product], limit: usize) -> Vec<TopProduct> {
    let catalogue: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();

    let mut totals: HashMap<ProductId, (Platform, u64, Money)> = HashMap::new();
    for sale in sales {
        let entry = totals.entry(sale.product_id).or_insert((sale.product_type, 0, Money::ZERO));
        entry.1 += u64::from(sale.quantity);
        entry.2 = entry.2.saturating_add(sale.amount);
    }

    let mut ranked: Vec<TopProduct> = totals
        .into_iter()
        .map(|(product_id, (platform, units, revenue))| {
            let product = catalogue.get(&product_id);
            TopProduct {
                product_id,
                username: product.map(|p| p.username.clone()),
                platform,
                status: product.map(|p| p.status),
                price: product.map(|p| p.price),
                units,
                revenue,
            }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then_with(|| b.units.cmp(&a.units))
            .then_with(|| a.product_id.as_uuid().cmp(b.product_id.as_uuid()))
    });
    ranked.truncate(limit);
    ranked
}

/// Revenue and mean sale amount per calendar month, oldest first.
#[must_use]
pub fn monthly_sales(sales: &[Sale]) -> Vec<MonthlySales> {
    let mut months: BTreeMap<(i32, u32), (Money, u64)> = BTreeMap::new();
    for sale in sales {
        let key = (sale.created_at.year(), sale.created_at.month0());
        let (total, count) = months.entry(key).or_default();
        *total = total.saturating_add(sale.amount);
        *count += 1;
    }
    months
        .into_iter()
        .map(|((year, month0), (revenue, count))| MonthlySales {
            year,
            month: MONTH_LABELS[month0 as usize % 12].to_string(),
            revenue,
            average_item_value: revenue.checked_div(count).unwrap_or_default(),
        })
        .collect()
}
