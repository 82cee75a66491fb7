//! Dashboard payloads.

use super::series::{
    DailyCount, DailySales, RegionalFigures, count_growth, daily_new_customers, daily_sales,
    money_growth, regional_breakdown, revenue,
};
use super::targets::{PerformanceTrend, SalesTarget, classify};
use crate::engine::ProductPerformance;
use serde::{Deserialize, Serialize};
use socialmart_core::{
    ActivityEntry, Customer, Money, Period, Product, ProductStatus, Sale, Transaction,
    TransactionStatus,
};
use std::collections::BTreeMap;

/// New customers in the window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerGrowth {
    /// New customers per day
    pub daily: Vec<DailyCount>,
    /// New customers in the window
    pub new_customers: u64,
    /// New customers in the previous window
    pub previous_new_customers: u64,
    /// Growth against the previous window, in percent
    pub growth: f64,
}

impl CustomerGrowth {
    /// Figures from customers who joined in `period` and in the window before it
    #[must_use]
    pub fn from_joins(period: Period, current: &[Customer], previous: &[Customer]) -> Self {
        let new_customers = current.len() as u64;
        let previous_new_customers = previous.len() as u64;
        Self {
            daily: daily_new_customers(period, current),
            new_customers,
            previous_new_customers,
            growth: count_growth(new_customers, previous_new_customers),
        }
    }
}

/// Everything the dashboard overview shows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DashboardOverview {
    /// Reported period
    pub period: Period,
    /// Region filter applied to sales and products
    pub region: Option<String>,
    /// Revenue, profit and orders per day
    pub sales_trends: Vec<DailySales>,
    /// Classification of the daily revenue
    pub revenue_trend: PerformanceTrend,
    /// Per-region revenue with growth
    pub regional_data: Vec<RegionalFigures>,
    /// Top products by popularity
    pub popular_products: Vec<ProductPerformance>,
    /// New customers
    pub customer_growth: CustomerGrowth,
    /// Latest activity log entries, newest first
    pub recent_activities: Vec<ActivityEntry>,
}

/// Inputs of [`DashboardOverview::assemble`], fetched from the store.
#[derive(Clone, Debug, Default)]
pub struct OverviewInputs {
    /// Sales in the window
    pub sales: Vec<Sale>,
    /// Sales in the previous window
    pub previous_sales: Vec<Sale>,
    /// Ranked products
    pub popular_products: Vec<ProductPerformance>,
    /// Customers who joined in the window
    pub joined: Vec<Customer>,
    /// Customers who joined in the previous window
    pub previously_joined: Vec<Customer>,
    /// Latest activity
    pub recent_activities: Vec<ActivityEntry>,
}

impl DashboardOverview {
    /// Build the overview for `period`
    #[must_use]
    pub fn assemble(period: Period, region: Option<String>, inputs: OverviewInputs) -> Self {
        let sales_trends = daily_sales(period, &inputs.sales);
        let daily_revenue: Vec<f64> = sales_trends.iter().map(|b| b.revenue.as_major_f64()).collect();
        Self {
            period,
            region,
            revenue_trend: classify(&daily_revenue),
            sales_trends,
            regional_data: regional_breakdown(&inputs.sales, &inputs.previous_sales),
            popular_products: inputs.popular_products,
            customer_growth: CustomerGrowth::from_joins(period, &inputs.joined, &inputs.previously_joined),
            recent_activities: inputs.recent_activities,
        }
    }
}

/// Revenue in the window against the previous window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevenueFigures {
    /// Revenue in the window
    pub value: Money,
    /// Revenue in the previous window
    pub previous_value: Money,
    /// Growth in percent
    pub growth: f64,
}

/// Customer counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerFigures {
    /// All customers
    pub value: u64,
    /// Customers who joined in the window
    pub new_customers: u64,
    /// Growth of new customers against the previous window, in percent
    pub growth: f64,
}

/// Transaction counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionFigures {
    /// Transactions created in the window
    pub value: u64,
    /// Mean transaction amount, zero without transactions
    pub average_ticket_size: Money,
    /// Growth of the count against the previous window, in percent
    pub growth: f64,
    /// Transactions per status label
    pub by_status: BTreeMap<String, u64>,
}

/// Product counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductFigures {
    /// All listed products
    pub value: u64,
    /// Products already sold
    pub out_of_stock: u64,
    /// Growth of new listings against the previous window, in percent
    pub growth: f64,
}

/// Headline figures of the dashboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    /// Reported period
    pub period: Period,
    /// Revenue against the seasonal target
    pub sales_target: SalesTarget,
    /// Revenue
    pub revenue: RevenueFigures,
    /// Customers
    pub customers: CustomerFigures,
    /// Transactions
    pub transactions: TransactionFigures,
    /// Products
    pub products: ProductFigures,
}

/// Inputs of [`DashboardMetrics::assemble`], fetched from the store.
#[derive(Clone, Debug, Default)]
pub struct MetricsInputs {
    /// Sales in the window
    pub sales: Vec<Sale>,
    /// Sales in the previous window
    pub previous_sales: Vec<Sale>,
    /// Number of customers
    pub customer_count: u64,
    /// Customers who joined in the window
    pub joined: u64,
    /// Customers who joined in the previous window
    pub previously_joined: u64,
    /// Transactions created in the window
    pub transactions: Vec<Transaction>,
    /// Transactions created in the previous window
    pub previous_transactions: u64,
    /// Every product
    pub products: Vec<Product>,
}

impl DashboardMetrics {
    /// Build the headline figures for `period`
    #[must_use]
    pub fn assemble(period: Period, sales_target: SalesTarget, inputs: &MetricsInputs) -> Self {
        let current_revenue = revenue(&inputs.sales);
        let previous_revenue = revenue(&inputs.previous_sales);

        let transaction_count = inputs.transactions.len() as u64;
        let mut by_status: BTreeMap<String, u64> =
            TransactionStatus::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
        for transaction in &inputs.transactions {
            *by_status.entry(transaction.status.as_str().to_string()).or_default() += 1;
        }
        let ticket_total: Money = inputs.transactions.iter().map(|t| t.amount).sum();

        let listed_now = inputs.products.iter().filter(|p| period.contains(p.created_at)).count() as u64;
        let listed_before =
            inputs.products.iter().filter(|p| period.previous().contains(p.created_at)).count() as u64;

        Self {
            period,
            sales_target,
            revenue: RevenueFigures {
                value: current_revenue,
                previous_value: previous_revenue,
                growth: money_growth(current_revenue, previous_revenue),
            },
            customers: CustomerFigures {
                value: inputs.customer_count,
                new_customers: inputs.joined,
                growth: count_growth(inputs.joined, inputs.previously_joined),
            },
            transactions: TransactionFigures {
                value: transaction_count,
                average_ticket_size: ticket_total.checked_div(transaction_count).unwrap_or_default(),
                growth: count_growth(transaction_count, inputs.previous_transactions),
                by_status,
            },
            products: ProductFigures {
                value: inputs.products.len() as u64,
                out_of_stock: inputs
                    .products
                    .iter()
                    .filter(|p| p.status == ProductStatus::Sold)
                    .count() as u64,
                growth: count_growth(listed_now, listed_before),
            },
        }
    }
}
