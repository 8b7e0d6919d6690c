use strata_store::AdapterRegistry;

/// Registry with every backend compiled into this build: `memory`, `sqlite`,
/// `redb`, and `mongodb` with the `mongodb` feature.
pub fn builtin_registry() -> AdapterRegistry {
    let registry = AdapterRegistry::new()
        .with(strata_sql::BACKEND, strata_sql::factory)
        .with(strata_kv::BACKEND, strata_kv::factory);
    #[cfg(feature = "mongodb")]
    let registry = registry.with(strata_mongo::BACKEND, strata_mongo::factory);
    registry
}
