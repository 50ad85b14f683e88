use crate::Error;

/// The result of one invocation of a [`Deferred`](crate::Deferred).
///
/// Exactly one `Outcome` is delivered per invocation.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Success(T),
    Failure(Error),
    /// The caller withdrew interest. Carries no payload and is not a failure.
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// Transforms the success value, passing failure and cancellation through.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(err) => Outcome::Failure(err),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    /// Like [`Outcome::map`], but the transform may itself fail or cancel.
    pub fn and_then<U, F: FnOnce(T) -> Outcome<U>>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Success(value) => f(value),
            Outcome::Failure(err) => Outcome::Failure(err),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Error> {
        match self {
            Outcome::Failure(err) => Some(err),
            _ => None,
        }
    }

    /// Collapses into a `Result`. Cancellation becomes `Err(None)`.
    pub fn into_result(self) -> Result<T, Option<Error>> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(err) => Err(Some(err)),
            Outcome::Cancelled => Err(None),
        }
    }
}

impl<T> From<Result<T, Error>> for Outcome<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err),
        }
    }
}

/// Which branch of a [`race`](crate::Deferred::race) won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<L, R> Either<L, R> {
    pub fn is_left(&self) -> bool {
        matches!(self, Either::Left(_))
    }

    pub fn is_right(&self) -> bool {
        matches!(self, Either::Right(_))
    }

    pub fn left(self) -> Option<L> {
        match self {
            Either::Left(value) => Some(value),
            Either::Right(_) => None,
        }
    }

    pub fn right(self) -> Option<R> {
        match self {
            Either::Left(_) => None,
            Either::Right(value) => Some(value),
        }
    }
}

impl<T> Either<T, T> {
    /// Drops the side information when both branches share a type.
    pub fn into_inner(self) -> T {
        match self {
            Either::Left(value) | Either::Right(value) => value,
        }
    }
}
