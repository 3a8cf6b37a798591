use axum::Router;

/// A service module that contributes HTTP routes.
///
/// Each business module (workflow, rma) implements this trait to expose
/// its operations. The server binary collects all modules and merges
/// their routers into one.
pub trait Module: Send + Sync {
    /// Module name, used for logging and route prefixes.
    fn name(&self) -> &str;

    /// Return the module's routes. Paths already carry the
    /// `/{name}/v1` prefix.
    fn routes(&self) -> Router;
}
