//! Declaration bundling engine.
//!
//! Walks the import/export graph of an entry declaration file, rewrites
//! references to third-party packages so they point at copies of those
//! packages' declaration trees, and leaves project-internal references alone.
//!
//! - Statement scanning (`DeclarationUnit`, `ModuleStatement`, `Span`)
//! - In-place text splicing (`TextEditor`)
//! - Module resolution (`ModuleResolver`, `ResolutionOutcome`)
//! - Dependency tree copies (`copy_dependency`)
//! - The recursive walk itself (`compile`)
//! - Host glue: options, entry discovery, after-emit hook (`DtsBundlePlugin`)

pub mod bundle;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod copier;
pub mod editor;
pub mod exclude;
pub mod package_json;
pub mod resolver;
pub mod scanner;

pub use bundle::{
    BuildMessage, BundleOptions, BundleReport, Compilation, DEFAULT_OUT_DIR, DtsBundlePlugin,
};
pub use cache::{BundleError, BundleErrorKind, ResolutionCache};
pub use compiler::compile;
pub use config::{CompilerOptions, ModuleResolutionKind, ResolvedCompilerOptions, load_config};
pub use copier::{CopiedDependency, copy_dependency};
pub use editor::TextEditor;
pub use exclude::{ExcludePattern, ExcludeSet};
pub use resolver::{ModuleResolver, ResolutionOutcome, UnresolvedReason};
pub use scanner::{DeclarationUnit, ModuleReference, ModuleStatement, Position, Span, StatementKind};
