//! Listing helpers: paging, `?ordering=` parsing and free-text search.

use platform_api::{ApiError, ApiResult};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, Order, QueryOrder, QuerySelect, Select,
    sea_query::{Expr, Func, LikeExpr},
};

pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 500;

/// Escape character for `LIKE` patterns; needs no quoting on any backend.
const LIKE_ESCAPE: char = '!';

/// `limit`/`offset` after bounds checking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Page {
    pub fn new(limit: Option<u64>, offset: Option<u64>) -> ApiResult<Self> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if limit == 0 || limit > MAX_LIMIT {
            return Err(ApiError::invalid(
                "limit",
                format!("Ensure this value is between 1 and {MAX_LIMIT}."),
            ));
        }
        Ok(Self {
            limit,
            offset: offset.unwrap_or(0),
        })
    }

    pub fn apply<E: EntityTrait>(self, select: Select<E>) -> Select<E> {
        select.limit(self.limit).offset(self.offset)
    }
}

/// Parse `field` / `-field` against the columns a resource allows ordering on.
pub fn ordering<C: Copy>(raw: Option<&str>, allowed: &[(&str, C)]) -> ApiResult<Option<(C, Order)>> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    let (name, order) = match raw.strip_prefix('-') {
        Some(name) => (name, Order::Desc),
        None => (raw, Order::Asc),
    };
    allowed
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, column)| Some((*column, order)))
        .ok_or_else(|| {
            let names: Vec<&str> = allowed.iter().map(|(field, _)| *field).collect();
            ApiError::invalid(
                "ordering",
                format!("Unknown ordering field \"{name}\"; expected one of {}.", names.join(", ")),
            )
        })
}

/// Apply the requested ordering, or the resource default, then a stable id tiebreak.
pub fn order<E, C>(
    select: Select<E>,
    requested: Option<(C, Order)>,
    default: (C, Order),
    id: E::Column,
) -> Select<E>
where
    E: EntityTrait,
    C: ColumnTrait,
{
    let (column, direction) = requested.unwrap_or(default);
    let tiebreak = direction.clone();
    select.order_by(column, direction).order_by(id, tiebreak)
}

/// Case-insensitive substring match across `columns`; blank terms match everything.
pub fn search<C: ColumnTrait>(term: Option<&str>, columns: &[C]) -> Option<Condition> {
    let term = term.map(str::trim).filter(|term| !term.is_empty())?;
    let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
    let condition = columns.iter().fold(Condition::any(), |condition, column| {
        condition.add(
            Expr::expr(Func::lower(Expr::col(*column)))
                .like(LikeExpr::new(pattern.clone()).escape(LIKE_ESCAPE)),
        )
    });
    Some(condition)
}

/// Make `%` and `_` in user input match literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Trim a filter value; blank means "not filtered".
pub fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn parse_bool(field: &str, value: Option<&str>) -> ApiResult<Option<bool>> {
    match clean(value).map(str::to_ascii_lowercase).as_deref() {
        None => Ok(None),
        Some("true" | "1" | "yes") => Ok(Some(true)),
        Some("false" | "0" | "no") => Ok(Some(false)),
        Some(_) => Err(ApiError::invalid(field, "Must be a valid boolean.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum Col {
        Name,
        Created,
    }

    const ALLOWED: &[(&str, Col)] = &[("company_name", Col::Name), ("created_at", Col::Created)];

    #[test]
    fn ordering_accepts_descending_prefix() {
        let parsed = ordering(Some("-created_at"), ALLOWED).unwrap().unwrap();
        assert_eq!(parsed.0, Col::Created);
        assert!(matches!(parsed.1, Order::Desc));
        let parsed = ordering(Some("company_name"), ALLOWED).unwrap().unwrap();
        assert!(matches!(parsed.1, Order::Asc));
        assert!(ordering(None, ALLOWED).unwrap().is_none());
        assert!(ordering(Some("  "), ALLOWED).unwrap().is_none());
    }

    #[test]
    fn unknown_ordering_is_invalid() {
        let err = ordering(Some("password"), ALLOWED).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn page_bounds() {
        assert_eq!(Page::new(None, None).unwrap(), Page { limit: DEFAULT_LIMIT, offset: 0 });
        assert!(Page::new(Some(0), None).is_err());
        assert!(Page::new(Some(MAX_LIMIT + 1), None).is_err());
        assert_eq!(Page::new(Some(5), Some(10)).unwrap().offset, 10);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("acme"), "acme");
        assert_eq!(escape_like("50%"), "50!%");
        assert_eq!(escape_like("a_b"), "a!_b");
        assert_eq!(escape_like("wow!"), "wow!!");
    }

    #[test]
    fn booleans() {
        assert_eq!(parse_bool("is_active", Some("True")).unwrap(), Some(true));
        assert_eq!(parse_bool("is_active", Some("0")).unwrap(), Some(false));
        assert_eq!(parse_bool("is_active", Some("")).unwrap(), None);
        assert!(parse_bool("is_active", Some("maybe")).is_err());
    }
}
