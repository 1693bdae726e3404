pub use enclose::*;

/// Starts a watcher, cloning the listed captures into the block.
///
/// ```ignore
/// watch!(observer, (calls) w => {
///     calls.set(calls.get() + 1);
///     w.read_value()
/// })?;
/// ```
#[macro_export]
macro_rules! watch {
    ($observer:expr, ( $($d_tt:tt)* ) $w:ident => $($b:tt)*) => {
        $observer.watch($crate::macros::enclose!(($( $d_tt )*) move |$w: &$crate::Observer<_>| { $($b)* }))
    };
    ($observer:expr, $w:ident => $($b:tt)*) => {
        $observer.watch(move |$w: &$crate::Observer<_>| { $($b)* })
    };
}
