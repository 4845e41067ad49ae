use std::fmt;
use std::sync::{Arc, Mutex};

/// A projection of query data that is recomputed only when the data or
/// the projection's argument changes.
///
/// Data identity is the cache's `Arc`, so a refetch that produces new data
/// invalidates the memo even when the values are equal. Use this when the
/// projection is expensive and its argument lives in view state, as in a
/// list filtered by the currently selected option.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use querent::query::Memoized;
///
/// let by_prefix = Memoized::new(|names: &Vec<String>, prefix: &String| {
///     names.iter().filter(|n| n.starts_with(prefix.as_str())).count()
/// });
///
/// let names = Arc::new(vec!["Divya".to_string(), "Sandra".to_string(), "Sam".to_string()]);
/// assert_eq!(by_prefix.get(&names, &"Sa".to_string()), 2);
/// ```
pub struct Memoized<V, A, S> {
    select: Box<dyn Fn(&V, &A) -> S + Send + Sync>,
    last: Mutex<Option<(Arc<V>, A, S)>>,
}

impl<V, A, S> fmt::Debug for Memoized<V, A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized").finish_non_exhaustive()
    }
}

impl<V, A, S> Memoized<V, A, S>
where
    A: PartialEq + Clone,
    S: Clone,
{
    pub fn new(select: impl Fn(&V, &A) -> S + Send + Sync + 'static) -> Self {
        Self {
            select: Box::new(select),
            last: Mutex::new(None),
        }
    }

    /// Returns the projection of `data` for `arg`, reusing the previous
    /// result when both are unchanged.
    pub fn get(&self, data: &Arc<V>, arg: &A) -> S {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((prev_data, prev_arg, value)) = last.as_ref() {
            if Arc::ptr_eq(prev_data, data) && prev_arg == arg {
                return value.clone();
            }
        }
        let value = (self.select)(data, arg);
        *last = Some((Arc::clone(data), arg.clone(), value.clone()));
        value
    }

    /// Forgets the memoized value.
    pub fn clear(&self) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
