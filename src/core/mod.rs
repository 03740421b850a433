//! Core data types for marker screening.
//!
//! - [`MarkerRecord`]: a reference marker fragment and its descriptors
//! - [`SequenceRecord`]: one read pulled from an input stream
//! - [`RunStatistics`]: read count and mean length of the whole input
//! - [`MarkerId`] and the sentinel labels written for reads without hits
//!
//! ## Marker fields
//!
//! | Column     | Field                    | Interpreted |
//! |------------|--------------------------|-------------|
//! | `sid`      | `id`                     | key         |
//! | `sanket`   | `sequence`               | substring   |
//! | `serotype` | `serotype`               | coverage    |
//! | `ssr_count`| `repeat_count`           | scoring     |
//! | `p_count`  | `palindrome_count`       | scoring     |
//! | others     | descriptive text         | no          |

pub mod marker;
pub mod read;
pub mod types;

pub use marker::MarkerRecord;
pub use read::{gc_percentage, SequenceRecord};
pub use types::{MarkerId, RunStatistics};
