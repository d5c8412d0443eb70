//! Postgres implementations of every repository trait this crate defines
//! (§9 "Interface polymorphism for database drivers"): the core is
//! polymorphic over the trait, driver selection happens once at startup
//! by constructing one of these against a `sqlx::PgPool`.

mod dek_repository;
mod kek_repository;
mod secret_repository;
mod token_repository;
mod tokenization_key_repository;
mod transit_key_repository;

pub use dek_repository::PostgresDekRepository;
pub use kek_repository::PostgresKekRepository;
pub use secret_repository::PostgresSecretRepository;
pub use token_repository::PostgresTokenRepository;
pub use tokenization_key_repository::PostgresTokenizationKeyRepository;
pub use transit_key_repository::PostgresTransitKeyRepository;
