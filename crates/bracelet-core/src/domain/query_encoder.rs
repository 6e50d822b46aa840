//! Query string encoder
//!
//! Pure translation of [`QueryParams`] into the query grammar of the
//! platform REST API:
//!
//! ```text
//! q=field.OP:value[ AND|OR field.OP:value]*
//! q.<embed>=...
//! embed=a,b(c,d)
//! fields=...
//! sort_by=field:ASC,field:DESC
//! limit=N
//! field=value            (raw passthrough)
//! ```
//!
//! Kinds are emitted in [`ParamKind`](super::query::ParamKind) order and
//! joined with `&`. Nothing is percent-escaped; raw and plain values are
//! the caller's responsibility.

use super::query::{Filter, FilterTerm, FilterValue, Projection, ProjectionItem, QueryParams, Scalar};

/// Stateless encoder for [`QueryParams`].
pub struct QueryEncoder;

impl QueryEncoder {
    /// Encodes `params`, optionally appending the result to `base_path`.
    ///
    /// # Arguments
    ///
    /// * `params` - Parameter set to encode
    /// * `base_path` - Path (or absolute URL) the query is appended to
    ///
    /// # Returns
    ///
    /// The bare query string when `base_path` is `None`; otherwise
    /// `base_path?query`, or `base_path` alone when the query is empty.
    pub fn encode(params: &QueryParams, base_path: Option<&str>) -> String {
        let query = Self::encode_query(params);
        match base_path {
            None => query,
            Some(path) if query.is_empty() => path.to_string(),
            Some(path) => format!("{path}?{query}"),
        }
    }

    fn encode_query(params: &QueryParams) -> String {
        if let Some(plain) = &params.plain {
            if plain.ignore_others {
                return plain.filters.clone();
            }
        }

        let mut parts: Vec<String> = Vec::new();

        if let Some(q) = &params.q {
            parts.push(Self::encode_filter("q", q));
        }

        if let Some(extras) = &params.q_extra {
            let rendered: Vec<String> = extras
                .iter()
                .map(|(embed, filter)| Self::encode_filter(&format!("q.{embed}"), filter))
                .collect();
            parts.push(rendered.join("&"));
        }

        if let Some(embed) = &params.embed {
            parts.push(format!("embed={}", Self::encode_projection(embed)));
        }

        if let Some(fields) = &params.fields {
            parts.push(format!("fields={}", Self::encode_projection(fields)));
        }

        if let Some(sort) = &params.sort {
            let rendered: Vec<String> = sort
                .iter()
                .map(|s| format!("{}:{}", s.field, s.direction.as_str()))
                .collect();
            parts.push(format!("sort_by={}", rendered.join(",")));
        }

        if let Some(limit) = params.limit {
            parts.push(format!("limit={limit}"));
        }

        if let Some(raw) = &params.raw {
            let rendered: Vec<String> = raw
                .iter()
                .map(|r| format!("{}={}", r.field, r.value))
                .collect();
            parts.push(rendered.join("&"));
        }

        if let Some(plain) = &params.plain {
            parts.push(plain.filters.clone());
        }

        parts.retain(|p| !p.is_empty());
        parts.join("&")
    }

    /// Renders `arg=term[ OP term]*`.
    pub fn encode_filter(arg: &str, filter: &Filter) -> String {
        let mut out = format!("{arg}={}", Self::encode_term(filter.first()));
        for (op, term) in filter.rest() {
            out.push(' ');
            out.push_str(op.as_str());
            out.push(' ');
            out.push_str(&Self::encode_term(term));
        }
        out
    }

    fn encode_term(term: &FilterTerm) -> String {
        format!(
            "{}.{}:{}",
            term.field,
            term.operation.as_str(),
            Self::encode_value(&term.value)
        )
    }

    /// Numbers unquoted, lists as `'a,b,c'`, everything else `'v'`.
    pub fn encode_value(value: &FilterValue) -> String {
        match value {
            FilterValue::One(s) if s.is_number() => s.to_string(),
            FilterValue::One(s) => format!("'{s}'"),
            FilterValue::Many(items) => {
                let joined: Vec<String> = items.iter().map(Scalar::to_string).collect();
                format!("'{}'", joined.join(","))
            }
        }
    }

    fn encode_projection(projection: &Projection) -> String {
        let inner: Vec<String> = projection
            .children
            .iter()
            .map(|child| match child {
                ProjectionItem::Name(name) => name.clone(),
                ProjectionItem::Nested(nested) => match &nested.parent {
                    Some(parent) => format!("{parent}({})", Self::encode_projection(nested)),
                    None => Self::encode_projection(nested),
                },
            })
            .collect();
        inner.join(",")
    }
}
