use super::policy::QueryPolicy;
use super::types::{DropReason, DroppedParam, SortDirection, SortField};

pub struct QueryOrder;

impl QueryOrder {
    /// Parses `field:asc,other:desc`. Any direction other than `desc` means
    /// ascending. Fields outside the policy are dropped; a repeated field
    /// keeps its first position and takes the last direction.
    pub fn parse(sort: &str, policy: &QueryPolicy) -> (Vec<SortField>, Vec<DroppedParam>) {
        let mut fields: Vec<SortField> = Vec::new();
        let mut dropped = Vec::new();

        for token in sort.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            let Some(field) = Self::parse_token(token) else { continue };

            if !policy.allows_field(&field.field) {
                dropped.push(DroppedParam::new(format!("sort={}", token), DropReason::SortFieldNotAllowed));
                continue;
            }

            match fields.iter_mut().find(|f| f.field == field.field) {
                Some(existing) => existing.direction = field.direction,
                None => fields.push(field),
            }
        }

        (fields, dropped)
    }

    fn parse_token(token: &str) -> Option<SortField> {
        let (name, direction) = match token.split_once(':') {
            Some((name, dir)) => (name.trim(), Self::direction(dir)),
            None => (token, SortDirection::Asc),
        };
        if name.is_empty() {
            return None;
        }
        Some(SortField { field: name.to_string(), direction })
    }

    fn direction(raw: &str) -> SortDirection {
        if raw.trim() == "desc" {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }
}
