//! Canvas state engine for the whiteboard.
//!
//! This crate keeps one authoritative board state (the entity store) in sync
//! with a persistent, layered, retained-mode scene graph. Tools mutate the
//! store through [`document::Document`], usually inside an undoable batch;
//! the store notifies subscribers; scene reactions are coalesced onto the next
//! frame by the [`scheduler::FrameScheduler`] and executed together by
//! [`engine::Engine::flush`]. The host is responsible only for driving frames
//! and presenting the scene graph.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Wiring: subscriptions, frame tasks, renderer registration, layer handles |
//! | [`document`] | Store + history facade handed to tools (mutation, query, history API) |
//! | [`store`] | Canonical entity map, z-order, selection, viewport and change events |
//! | [`history`] | Undo/redo entries, nested batching, replay |
//! | [`entity`] | Entity records, categories, styles and sparse patches |
//! | [`viewport`] | Pan/zoom transform and coordinate conversions |
//! | [`scheduler`] | Per-frame task coalescing with priority lanes |
//! | [`scene`] | Retained-mode scene graph with five compositing layers |
//! | [`reconcile`] | Per-category reconcilers mapping entities onto scene nodes |
//! | [`sync`] | Single writer of the scene's view transform |
//! | [`transform`] | Interactive move/resize/rotate of the selection |
//! | [`hit`] | Hit-testing of entities and transform handles |
//! | [`persist`] | Persisted board snapshot layout |
//! | [`config`] | Engine configuration (env and JSON) |
//! | [`consts`] | Shared numeric constants |

pub mod config;
pub mod consts;
pub mod document;
pub mod engine;
pub mod entity;
pub mod hit;
pub mod history;
pub mod persist;
pub mod reconcile;
pub mod scene;
pub mod scheduler;
pub mod store;
pub mod sync;
pub mod transform;
pub mod viewport;

pub use kurbo::{Point, Rect, Vec2};
