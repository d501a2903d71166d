//! Cross-crate behavioral tests for PerdidosYa! live under `tests/`.
