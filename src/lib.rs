//! A headless digital-logic simulation core.
//!
//! Circuits are graphs of buses (wires carrying arbitrary-width
//! [`BitValue`]s) and elements (gates, plexers, arithmetic, flip-flops,
//! memories, splitters, subcircuits) assembled by external loaders and
//! driven to stability by an event-driven scheduler.
//!
//! The crate notably consists of:
//! - **[`bitvalue`]**: the immutable MSB-first bit-vector value type.
//! - **[`element`]**: every element kind, behind the
//!   [`Component`](element::Component) trait and the
//!   [`ComponentFn`](element::ComponentFn) enum.
//! - **[`circuit`]**: circuit structure (buses, labels, width
//!   propagation) and run state (values, timestamps, the event queue).
//! - **[`project`]**: the client API — lookup by id or name, `run` with
//!   named or positional stimulus, clocked runs, memory access.
//! - **[`netlist`]**: the serde description model loaders produce.
//! - **[`logging`]**: hierarchical, level- and subsystem-filtered
//!   diagnostics.
//!
//! ```
//! use logicflow::{bits, Project, Stimulus};
//! use logicflow::circuit::Circuit;
//! use logicflow::element::Xor;
//!
//! let mut project = Project::new("demo");
//! let ck = project.add_circuit(Circuit::new("c0", "parity")).unwrap();
//! let forest = project.forest_mut();
//! let (_, a) = forest.add_input(ck, "a", 1).unwrap();
//! let (_, b) = forest.add_input(ck, "b", 1).unwrap();
//! let (_, y) = forest.add_output(ck, "y", 1).unwrap();
//! let xor = forest.add_element(ck, Xor::new(1, 2), None, 1).unwrap();
//! forest[ck].connect_all(xor, &[a, b, y]).unwrap();
//!
//! let report = project
//!     .run(ck, Stimulus::named([("a", bits![1]), ("b", bits![0])]), None)
//!     .unwrap();
//! assert_eq!(report.outputs.get("y"), Some(&Some(bits![1])));
//! ```

pub mod bitvalue;
pub mod circuit;
pub mod element;
pub mod error;
pub mod logging;
pub mod netlist;
pub mod project;

pub use bitvalue::BitValue;
pub use error::SimError;
pub use project::{Project, Response, RunReport, Stimulus};
