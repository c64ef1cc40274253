/// Recommended error type for your test `main` function and any shared behaviour code that you
/// write for hooks. This type is compatible with the [crate::definition::HookResult] type so you can
/// use `?` to propagate errors.
pub type GauntletResult<T> = anyhow::Result<T>;
