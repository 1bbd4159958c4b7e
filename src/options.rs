//! Contains all of the types needed to configure the core and the operations it runs.
//!
//! Most of the options structs in this module use the
//! [`typed-builder`](https://crates.io/crates/typed-builder) crate to derive a type-safe builder
//! API on them. For example, to create an instance of
//! [`ClientOptions`](struct.ClientOptions.html) with only `repl_set_name` and `local_threshold`
//! set, the builder API can be used as follows:
//!
//! ```rust
//! # use std::time::Duration;
//! # use mongodb_core::options::ClientOptions;
//! #
//! # let options = ClientOptions::builder()
//! #                   .repl_set_name("rs0".to_string())
//! #                   .local_threshold(Duration::from_millis(20))
//! #                   .build();
//! ```

pub use crate::{
    client::options::*,
    concern::*,
    operation::{ReplyFieldNames, ReplyVariant, WriteKind, WriteOperation},
    selection_criteria::*,
};
