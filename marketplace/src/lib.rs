//! # Socialmart
//!
//! Settlement, segmentation and reporting core of a marketplace for social-media accounts.
//!
//! ## Architecture
//!
//! ```text
//! payment webhook ──► Marketplace::apply_payment_update
//!                          │
//!                          ▼
//!                  SettlementCoordinator ──► EntityStore (PostgreSQL / in-memory)
//!                          │                     ▲
//!                          ▼                     │
//!           popularity / segment engine   ReportingAggregator ◄── dashboards, report job
//! ```
//!
//! - **Settlement** turns a completed, paid transaction into exactly one sale and applies
//!   every side effect (product counters, customer spend, segment, activity) at most once.
//! - **Engine** holds the pure scoring rules: popularity, conversion and spend tiers.
//! - **Reporting** computes dashboards and sales reports from stored data on demand.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use socialmart::{Marketplace, MarketplaceSettings, TimeRange};
//! use socialmart_core::SystemClock;
//! use socialmart_postgres::{PoolSettings, PostgresEntityStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresEntityStore::connect("postgres://localhost/socialmart", &PoolSettings::default()).await?;
//! store.migrate().await?;
//!
//! let marketplace = Marketplace::new(Arc::new(store), Arc::new(SystemClock), MarketplaceSettings::default());
//! let metrics = marketplace.get_dashboard_metrics(TimeRange::Weekly).await?;
//! println!("revenue this week: {}", metrics.revenue.value);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod reporting;
pub mod service;
pub mod settlement;

pub use config::Config;
pub use error::{MarketError, Result, ValidationError};
pub use jobs::{ReportJob, ReportRun};
pub use reporting::{DashboardMetrics, DashboardOverview, ReportingAggregator, SalesReport, TimeRange};
pub use service::{Marketplace, MarketplaceSettings, Requester};
pub use settlement::{PaymentUpdate, SettlementCoordinator, SettlementReceipt};
