//! # barback-core: Pure Business Logic for Barback
//!
//! Everything that decides a number in Barback lives here: what a cart
//! costs, how much tax a province charges on it, when a bottle needs to be
//! reordered, and what the sales history says about the menu.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Barback Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    React SPA (not in this repo)                 │   │
//! │  │    Inventory ──► Sales / Cart ──► Tabs ──► Analytics           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ REST /api (JSON)                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    barback-server (axum)                        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ barback-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌────────┐ ┌────────┐ ┌────────┐ ┌─────────┐ ┌───────────┐   │   │
//! │  │   │ money  │ │  tax   │ │  cart  │ │ reorder │ │ analytics │   │   │
//! │  │   └────────┘ └────────┘ └────────┘ └─────────┘ └───────────┘   │   │
//! │  │   ┌────────┐ ┌────────────┐ ┌────────┐                         │   │
//! │  │   │ types  │ │ validation │ │  csv   │                         │   │
//! │  │   └────────┘ └────────────┘ └────────┘                         │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO CLOCK                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    barback-db (Store layer)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Recipe, Sale, Tab, User, Settings)
//! - [`money`] - Integer cents with exact decimal parsing
//! - [`tax`] - Province-aware tax breakdowns
//! - [`cart`] - Cart lines and totals
//! - [`checkout`] - Cart to sale rows, with cost snapshots and stock deltas
//! - [`reorder`] - Daily-consumption restock heuristic
//! - [`analytics`] - The fourteen dashboard aggregations
//! - [`csv_io`] - Product/sales CSV encode and decode
//! - [`validation`] - Business rule validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use barback_core::tax::{calculate_tax, TaxRegion};
//!
//! let result = calculate_tax(100.0, TaxRegion::Alberta, 8.0);
//! assert_eq!(result.components[0].name, "GST");
//! assert_eq!(result.total, 5.0);
//! assert_eq!(result.grand_total, 105.0);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod analytics;
pub mod cart;
pub mod checkout;
pub mod csv_io;
pub mod error;
pub mod money;
pub mod reorder;
pub mod tax;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart or tab.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest price or cost accepted for a product or recipe ($100,000.00).
pub const MAX_PRICE_CENTS: i64 = 10_000_000;
