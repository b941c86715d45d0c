/// Settlement of a promise: a value or an error. Errors travel through
/// chains as values, never as panics.
///
/// `Outcome<(), E>` is the unit form used by promises that carry no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Value(T),
    Error(E),
}

impl<T, E> Outcome<T, E> {
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn is_value(&self) -> bool {
        !self.is_error()
    }

    /// # Panics
    ///
    /// Panics if the outcome is an error.
    pub fn value(self) -> T {
        match self {
            Outcome::Value(v) => v,
            Outcome::Error(_) => panic!("value() called on an error outcome"),
        }
    }

    /// # Panics
    ///
    /// Panics if the outcome is a value.
    pub fn error(self) -> E {
        match self {
            Outcome::Error(e) => e,
            Outcome::Value(_) => panic!("error() called on a value outcome"),
        }
    }

    pub fn value_or(self, default: T) -> T {
        match self {
            Outcome::Value(v) => v,
            Outcome::Error(_) => default,
        }
    }

    pub fn error_or(self, default: E) -> E {
        match self {
            Outcome::Error(e) => e,
            Outcome::Value(_) => default,
        }
    }

    pub fn as_ref(&self) -> Outcome<&T, &E> {
        match self {
            Outcome::Value(v) => Outcome::Value(v),
            Outcome::Error(e) => Outcome::Error(e),
        }
    }
}

impl<E> Outcome<(), E> {
    pub fn ok() -> Self {
        Outcome::Value(())
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(r: Result<T, E>) -> Self {
        match r {
            Ok(v) => Outcome::Value(v),
            Err(e) => Outcome::Error(e),
        }
    }
}

impl<T, E> From<Outcome<T, E>> for Result<T, E> {
    fn from(o: Outcome<T, E>) -> Self {
        match o {
            Outcome::Value(v) => Ok(v),
            Outcome::Error(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Outcome;

    #[test]
    fn value_and_error_accessors() {
        let v: Outcome<i32, String> = Outcome::Value(7);
        assert!(v.is_value());
        assert!(!v.is_error());
        assert_eq!(v.value(), 7);

        let e: Outcome<i32, String> = Outcome::Error("nope".into());
        assert!(e.is_error());
        assert_eq!(e.error(), "nope");
    }

    #[test]
    fn defaults() {
        let v: Outcome<i32, String> = Outcome::Value(7);
        assert_eq!(v.clone().value_or(0), 7);
        assert_eq!(v.error_or("fallback".into()), "fallback");
    }

    #[test]
    fn unit_outcome_is_value() {
        // the unit form must report is_value for Ok, not pin it to false
        let ok: Outcome<(), String> = Outcome::ok();
        assert!(ok.is_value());
        let err: Outcome<(), String> = Outcome::Error("boom".into());
        assert!(!err.is_value());
        assert!(err.is_error());
    }

    #[test]
    fn result_interop() {
        let o: Outcome<i32, String> = Ok(3).into();
        assert_eq!(o, Outcome::Value(3));
        let r: Result<i32, String> = Outcome::Error("e".to_string()).into();
        assert_eq!(r, Err("e".to_string()));
    }
}
