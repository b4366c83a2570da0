/// Config for a container
/// ## Fields
/// - `allow_circular_references`:
///   If `true`, singletons under construction expose their raw instance as an early reference,
///   so setter/field cycles between singletons resolve.
///   Constructor cycles can't be resolved either way.
///
/// - `allow_raw_injection_despite_wrapping`:
///   If `false`, creation fails when a post-processor replaces a bean whose raw early reference
///   was already injected into other beans.
///
/// - `allow_definition_overriding`:
///   If `true`, registering a definition under an existing name replaces it.
///
/// - `cache_bean_metadata`:
///   If `false`, merged definitions are cached only for beans that have been created.
///
/// - `suppressed_errors_limit`:
///   Max count of suppressed errors collected into one creation failure.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub allow_circular_references: bool,
    pub allow_raw_injection_despite_wrapping: bool,
    pub allow_definition_overriding: bool,
    pub cache_bean_metadata: bool,
    pub suppressed_errors_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allow_circular_references: true,
            allow_raw_injection_despite_wrapping: false,
            allow_definition_overriding: true,
            cache_bean_metadata: true,
            suppressed_errors_limit: 100,
        }
    }
}
