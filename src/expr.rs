use std::fmt::{self, Display};

/// Boolean combination of predicates
///
/// There is no `Not` node: negation is pushed down into the predicates when
/// the tree is built, so both the tree and its textual rendering stay within
/// the AND/OR form the query engine accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr<P> {
    And(Box<Self>, Box<Self>),
    Or(Box<Self>, Box<Self>),
    Predicate(P),
}

/// Predicates that can express their own complement
pub trait Negate {
    fn negate(self) -> Self;
}

impl<P> Expr<P> {
    pub fn and(a: Self, b: Self) -> Self {
        Self::And(Box::new(a), Box::new(b))
    }

    pub fn or(a: Self, b: Self) -> Self {
        Self::Or(Box::new(a), Box::new(b))
    }

    /// OR over all items, `None` when there are none
    pub fn any(items: impl IntoIterator<Item = Self>) -> Option<Self> {
        items.into_iter().reduce(Self::or)
    }

    /// AND over all items, `None` when there are none
    pub fn all(items: impl IntoIterator<Item = Self>) -> Option<Self> {
        items.into_iter().reduce(Self::and)
    }

    /// Evaluate with short-circuiting, deciding leaves with `f`
    pub fn eval<F: Fn(&P) -> bool>(&self, f: &F) -> bool {
        match self {
            Self::And(a, b) => a.eval(f) && b.eval(f),
            Self::Or(a, b) => a.eval(f) || b.eval(f),
            Self::Predicate(p) => f(p),
        }
    }

    /// True if any leaf satisfies `f`
    pub fn any_predicate<F: Fn(&P) -> bool>(&self, f: &F) -> bool {
        match self {
            Self::And(a, b) | Self::Or(a, b) => a.any_predicate(f) || b.any_predicate(f),
            Self::Predicate(p) => f(p),
        }
    }

    /// Weaker tree without the leaves `exact` rejects, each read as true
    ///
    /// Every item matched by `self` is matched by the result. `None` means
    /// nothing is left to constrain.
    pub fn relax<F: Fn(&P) -> bool>(&self, exact: &F) -> Option<Self>
    where
        P: Clone,
    {
        match self {
            Self::And(a, b) => match (a.relax(exact), b.relax(exact)) {
                (Some(a), Some(b)) => Some(Self::and(a, b)),
                (Some(one), None) | (None, Some(one)) => Some(one),
                (None, None) => None,
            },
            Self::Or(a, b) => Some(Self::or(a.relax(exact)?, b.relax(exact)?)),
            Self::Predicate(p) if exact(p) => Some(Self::Predicate(p.clone())),
            Self::Predicate(_) => None,
        }
    }

    fn is_or(&self) -> bool {
        matches!(self, Self::Or(..))
    }

    fn is_and(&self) -> bool {
        matches!(self, Self::And(..))
    }
}

impl<P: Negate> Expr<P> {
    /// Logical complement via De Morgan
    pub fn negate(self) -> Self {
        match self {
            Self::And(a, b) => Self::or(a.negate(), b.negate()),
            Self::Or(a, b) => Self::and(a.negate(), b.negate()),
            Self::Predicate(p) => Self::Predicate(p.negate()),
        }
    }
}

fn write_child<P: Display>(
    f: &mut fmt::Formatter<'_>,
    child: &Expr<P>,
    parenthesize: bool,
) -> fmt::Result {
    if parenthesize {
        write!(f, "({})", child)
    } else {
        write!(f, "{}", child)
    }
}

impl<P: Display> Display for Expr<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(a, b) => {
                write_child(f, a, a.is_or())?;
                f.write_str(" AND ")?;
                write_child(f, b, b.is_or())
            }
            Self::Or(a, b) => {
                write_child(f, a, a.is_and())?;
                f.write_str(" OR ")?;
                write_child(f, b, b.is_and())
            }
            Self::Predicate(p) => write!(f, "{}", p),
        }
    }
}
