//! # resourceid
//!
//! Typed, hierarchical identifiers for Azure Resource Manager resources.
//!
//! Every resource kind declares an [`IdPattern`]: an ordered list of
//! [`Segment`]s describing its address, optionally linked to the pattern of
//! its parent. A [`ResourceId`] is a pattern plus the values of its
//! user-supplied segments. Ids are immutable once built; equality is path
//! equality.
//!
//! ## Example
//!
//! ```
//! use resourceid::{IdPattern, ResourceId, Segment};
//!
//! static FLEET: IdPattern = IdPattern::new(
//!     "Fleet",
//!     &[
//!         Segment::Static("subscriptions"),
//!         Segment::Value("subscriptionId"),
//!         Segment::Static("resourceGroups"),
//!         Segment::Value("resourceGroupName"),
//!         Segment::Static("providers"),
//!         Segment::Static("Microsoft.AzureFleet"),
//!         Segment::Static("fleets"),
//!         Segment::Value("fleetName"),
//!     ],
//! );
//!
//! // Segment keys are matched case-insensitively, values keep their case.
//! let id = ResourceId::parse(
//!     &FLEET,
//!     "/SUBSCRIPTIONS/0000/resourcegroups/My-RG/providers/microsoft.azurefleet/fleets/Fleet1",
//! )
//! .unwrap();
//!
//! assert_eq!(id.get("resourceGroupName"), Some("My-RG"));
//! assert_eq!(
//!     id.to_string(),
//!     "/subscriptions/0000/resourceGroups/My-RG/providers/Microsoft.AzureFleet/fleets/Fleet1"
//! );
//! ```
//!
//! For ids whose kind is not known up front (a `source_image_id`, a
//! `virtual_network_id`), [`ArmPath`] splits any well-formed ARM path into
//! key/value pairs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod path;
pub mod pattern;

pub use error::{ParseError, Result};
pub use path::ArmPath;
pub use pattern::{IdPattern, ResourceId, Segment};
