//! Workspace tooling package. It exists so `rusty-hook` can install the
//! pre-commit hook configured in the root `Cargo.toml`.
