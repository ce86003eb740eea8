/// Clamp `value` into `[min, max]`. `Parameter::set` uses this so a
/// numerical set can never move a value out of its registered range,
/// matching the source's `NumericalParameter::set` which refuses the
/// assignment outright rather than saturating -- callers that want the
/// round-trip invariant from the testable-properties section (`set` then
/// `get` returns the clamped value) call this explicitly.
#[allow(dead_code)]
pub(crate) fn clamp_i32(value: i32, min: i32, max: i32) -> i32 {
    value.clamp(min, max)
}
