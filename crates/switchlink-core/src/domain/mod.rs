//! Domain types for switchlink.
//!
//! This module contains pure value types with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers. The innermost
//! layer is the **domain**. Domain code has no imports from network libraries
//! or UI frameworks, and can be compiled and tested anywhere without setup.
//!
//! Here the domain is small: how a button names its server and entity
//! ([`settings`]), and how a switch value maps onto a two-state key
//! ([`state`]). Outer layers depend on these types; they never depend back.

/// Connection settings, connection keys and credentials.
pub mod settings;

/// Boolean value to display-state polarity.
pub mod state;
