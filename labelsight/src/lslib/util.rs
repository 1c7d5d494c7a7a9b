use std::fmt::Debug;
use tracing::error;

pub fn trace_ok_err<T, E>(x: Result<T, E>) -> Option<T>
where
    E: Debug,
{
    match x {
        Ok(x) => Some(x),
        Err(e) => {
            error!("{e:?}");
            None
        }
    }
}

pub struct Defer<F: FnMut()> {
    pub func: F,
}
impl<F: FnMut()> Drop for Defer<F> {
    fn drop(&mut self) {
        (self.func)();
    }
}
#[macro_export]
macro_rules! defer {
    ($f:expr) => {
        let _dfr = $crate::util::Defer { func: $f };
    };
}
#[macro_export]
macro_rules! time_scope {
    ($name:expr) => {
        let now = std::time::Instant::now();
        #[cfg(feature = "print_timings")]
        let f = || eprintln!("{} {}", $name, now.elapsed().as_micros());
        #[cfg(not(feature = "print_timings"))]
        let f = || ();
        $crate::defer!(f);
    };
}

/// `[r, g, b]` as used in the config, e.g., `[255, 0, 0]` for red.
pub fn color_from_arr(rgb: [u8; 3]) -> image::Rgba<u8> {
    let [r, g, b] = rgb;
    image::Rgba([r, g, b, 255])
}

#[test]
fn test_defer() {
    use std::cell::Cell;
    let called = Cell::new(false);
    {
        let f = || called.set(true);
        defer!(f);
        assert!(!called.get());
    }
    assert!(called.get());
}

#[test]
fn test_trace_ok() {
    assert_eq!(trace_ok_err(Ok::<_, String>(1)), Some(1));
    assert_eq!(trace_ok_err(Err::<i32, _>("bad")), None);
}
