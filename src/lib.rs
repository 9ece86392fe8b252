//! # kestr
//!
//! **A background indexing daemon that keeps a local codebase searchable by
//! keyword and semantic similarity.**
//!
//! kestr scans a root directory, chunks text files into line windows,
//! computes dense embedding vectors for each chunk, and maintains both a
//! persistent SQLite store (content, metadata, raw vectors) and an
//! in-memory HNSW index for low-latency similarity queries. A file-system
//! watcher drives incremental re-indexing as files change, and a local
//! Unix-socket endpoint answers query/status/reindex requests from clients.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐        ┌───────────┐
//! │ Scanner  │──▶│          │        │  SQLite    │
//! └──────────┘   │  Queue   │──▶ Worker ──▶ files │
//! ┌──────────┐   │  (FIFO)  │    │   │   + chunks │
//! │ Watcher  │──▶│          │    │   └─────┬─────┘
//! └──────────┘   └──────────┘    ▼         │
//!                            ┌────────┐    │
//!                            │  HNSW  │◀───┘ (bootstrap load)
//!                            └────┬───┘
//!                                 │
//!                       ┌─────────┴─────────┐
//!                       │  IPC (kestr.sock) │
//!                       │ ping/status/query │
//!                       └───────────────────┘
//! ```
//!
//! ## Data flow
//!
//! 1. The **scanner** ([`scanner`]) walks the root, prunes ignored
//!    subtrees ([`ignore`]), and emits [`scanner::FileInfo`] records keyed
//!    by a SHA-256 content hash ([`hash`]).
//! 2. The **watcher** ([`watcher`]) translates OS change events into the
//!    same work items, or into direct deletions.
//! 3. Both feed the **work queue** ([`queue`]), consumed by the single
//!    **indexer worker** ([`worker`]): read, chunk ([`chunk`]), embed
//!    ([`embedding`]), and commit to the **store** ([`store`]) and the
//!    **vector index** ([`vector_index`]) in one transactional step.
//! 4. The **IPC server** ([`server`]) answers queries through the hybrid
//!    retrieval path ([`search`]): semantic-first over the ANN, keyword
//!    fallback over the store.
//! 5. Startup residency is governed by the **memory mode** ([`config`]):
//!    `ram` loads every stored vector, `hybrid` caps residency, `disk`
//!    skips the ANN entirely ([`daemon`]).
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | JSON configuration, memory modes, platform directories |
//! | [`hash`] | Streaming SHA-256 content hashing (the change key) |
//! | [`ignore`] | Glob ignore set (`.kestr_ignore` + built-in defaults) |
//! | [`scanner`] | Recursive directory scan producing work items |
//! | [`chunk`] | Overlapping line-window chunker |
//! | [`queue`] | Unbounded FIFO handoff to the indexer worker |
//! | [`store`] | SQLite persistence for files, chunks, and vectors |
//! | [`embedding`] | `Embedder` capability: Ollama, OpenAI, local ONNX |
//! | [`vector_index`] | In-memory HNSW over chunk ids (L2) |
//! | [`worker`] | Queue consumer: read → chunk → embed → commit |
//! | [`watcher`] | OS event adapter feeding the queue |
//! | [`search`] | Hybrid query path with keyword fallback |
//! | [`server`] | Unix-socket IPC: ping, status, reindex, shutdown, query |
//! | [`daemon`] | Lifecycle wiring, memory-mode bootstrap, shutdown |

pub mod chunk;
pub mod config;
pub mod daemon;
pub mod embedding;
pub mod hash;
pub mod ignore;
pub mod queue;
pub mod scanner;
pub mod search;
pub mod server;
pub mod store;
pub mod vector_index;
pub mod watcher;
pub mod worker;
