//! # Istanbul BFT Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── cluster.rs      # Deterministic in-process validator cluster
//!     ├── scenarios.rs    # End-to-end consensus scenarios
//!     └── boundaries.rs   # Thresholds, rejections, timers
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p ibft-tests
//!
//! # By category
//! cargo test -p ibft-tests integration::scenarios::
//!
//! # Benchmarks
//! cargo bench -p ibft-tests
//! ```

pub mod integration;
