/// Navigation payload macros
///
/// Build a `NavParams` from `name => value` pairs
///
/// Every value goes through the same plain-data validation as
/// `NavParams::insert`, so the macro yields a `Result`.
///
/// # Examples
/// ```
/// let params = wayfinder::nav_params! { "feedId" => 42, "tab" => "latest" }.unwrap();
/// assert_eq!(params.get_i64("feedId"), Some(42));
/// assert_eq!(params.get_str("tab"), Some("latest"));
///
/// let empty = wayfinder::nav_params!().unwrap();
/// assert!(empty.is_empty());
/// ```
#[macro_export]
macro_rules! nav_params {
    () => {
        $crate::Result::<$crate::navigation::NavParams>::Ok($crate::navigation::NavParams::new())
    };

    { $($name:expr => $value:expr),+ $(,)? } => {{
        (|| -> $crate::Result<$crate::navigation::NavParams> {
            let mut params = $crate::navigation::NavParams::new();
            $(
                params.insert($name, &$value)?;
            )+
            Ok(params)
        })()
    }};
}
