//! Row-level access restrictions for list queries.
//!
//! Every list query is scoped to the caller's client and organizations and,
//! for reads, filtered through the role's record-access rules. The
//! [`AccessContext`] is passed in explicitly by the caller; nothing here
//! reads session state on its own.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{QueryError, QueryResult};
use super::predicate::{ColumnRef, Comparison, CompiledPredicate, Predicate, SqlValue};
use super::schema::TableSchema;

/// Client scoping column present on every ERP record.
pub const CLIENT_COLUMN: &str = "AD_Client_ID";

/// Organization scoping column present on every ERP record.
pub const ORG_COLUMN: &str = "AD_Org_ID";

/// Identity of the caller, supplied by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessContext {
    /// Session the request belongs to; page tokens are bound to it.
    pub session_id: String,
    pub role_id: i64,
    pub client_id: i64,
    /// Organizations the role may read.
    pub organization_ids: BTreeSet<i64>,
}

impl AccessContext {
    pub fn new(
        session_id: impl Into<String>,
        role_id: i64,
        client_id: i64,
        organization_ids: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            role_id,
            client_id,
            organization_ids: organization_ids.into_iter().collect(),
        }
    }
}

/// Source of role-specific record restrictions (the authorization
/// collaborator).
pub trait AccessPolicy: Send + Sync {
    /// Predicate excluding rows of `table` the role may not see, or `None`
    /// when the role is unrestricted on that table.
    fn access_predicate(
        &self,
        table: &TableSchema,
        alias: &str,
        role_id: i64,
        read_only: bool,
    ) -> QueryResult<Option<Predicate>>;
}

/// Policy that applies no record-level restriction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrestricted;

impl AccessPolicy for Unrestricted {
    fn access_predicate(
        &self,
        _table: &TableSchema,
        _alias: &str,
        _role_id: i64,
        _read_only: bool,
    ) -> QueryResult<Option<Predicate>> {
        Ok(None)
    }
}

/// Record-access rules from the ERP's `AD_Record_Access` table.
///
/// Active rows for the role and table come in two kinds. An exclusion
/// (`IsExclude = 'Y'`) hides its record. An inclusion (`IsExclude = 'N'`)
/// limits the role to the included records only; with no inclusions the
/// role sees every record not excluded. Rules restrict reads; the write
/// side is not checked here, so no predicate is produced for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordAccessPolicy;

impl RecordAccessPolicy {
    const EXCLUDED: &'static str = "SELECT ra.Record_ID FROM AD_Record_Access ra \
         INNER JOIN AD_Table t ON (t.AD_Table_ID = ra.AD_Table_ID) \
         WHERE UPPER(t.TableName) = UPPER(?) AND ra.AD_Role_ID = ? \
         AND ra.IsActive = 'Y' AND ra.IsExclude = 'Y'";

    const INCLUDED: &'static str = "SELECT ra.Record_ID FROM AD_Record_Access ra \
         INNER JOIN AD_Table t ON (t.AD_Table_ID = ra.AD_Table_ID) \
         WHERE UPPER(t.TableName) = UPPER(?) AND ra.AD_Role_ID = ? \
         AND ra.IsActive = 'Y' AND ra.IsExclude = 'N'";
}

impl AccessPolicy for RecordAccessPolicy {
    fn access_predicate(
        &self,
        table: &TableSchema,
        alias: &str,
        role_id: i64,
        read_only: bool,
    ) -> QueryResult<Option<Predicate>> {
        if !read_only {
            return Ok(None);
        }
        let Some(key) = table.key_column() else {
            return Ok(None);
        };
        let key = ColumnRef::new(alias, key);
        let table_name = SqlValue::Text(table.table_name().to_string());
        let role = SqlValue::Integer(role_id);
        let fragment = CompiledPredicate::raw(
            format!(
                "{key} NOT IN ({excluded}) AND (NOT EXISTS ({included}) OR {key} IN ({included}))",
                excluded = Self::EXCLUDED,
                included = Self::INCLUDED,
            ),
            vec![
                table_name.clone(),
                role.clone(),
                table_name.clone(),
                role.clone(),
                table_name,
                role,
            ],
        )?;
        Ok(Some(Predicate::Raw(fragment)))
    }
}

/// Appends client, organization and record-access predicates to a
/// compiled filter.
pub struct AccessAugmenter<'a> {
    policy: &'a dyn AccessPolicy,
}

impl<'a> AccessAugmenter<'a> {
    pub fn new(policy: &'a dyn AccessPolicy) -> Self {
        Self { policy }
    }

    /// AND the access predicates after `base`.
    ///
    /// Fails with [`QueryError::AccessDenied`] when the context grants no
    /// organization at all.
    pub fn augment(
        &self,
        base: CompiledPredicate,
        table: &TableSchema,
        alias: &str,
        access: &AccessContext,
        read_only: bool,
    ) -> QueryResult<CompiledPredicate> {
        if access.organization_ids.is_empty() {
            return Err(QueryError::AccessDenied {
                role_id: access.role_id,
            });
        }

        let mut predicates = Vec::with_capacity(3);
        if let Some(client) = table.column(CLIENT_COLUMN) {
            predicates.push(Predicate::Compare {
                column: ColumnRef::new(alias, &client.column_name),
                op: Comparison::Eq,
                value: SqlValue::Integer(access.client_id),
            });
        }
        if let Some(org) = table.column(ORG_COLUMN) {
            predicates.push(Predicate::InList {
                column: ColumnRef::new(alias, &org.column_name),
                values: access
                    .organization_ids
                    .iter()
                    .copied()
                    .map(SqlValue::Integer)
                    .collect(),
                negated: false,
            });
        }
        if read_only
            && let Some(record) =
                self.policy
                    .access_predicate(table, alias, access.role_id, read_only)?
        {
            predicates.push(record);
        }

        debug!(
            table = table.table_name(),
            role_id = access.role_id,
            restrictions = predicates.len(),
            "applied access restrictions"
        );

        Ok(base.and(CompiledPredicate::from_predicates(&predicates)))
    }
}

/// Apply access restrictions with `policy`.
pub fn augment(
    policy: &dyn AccessPolicy,
    base: CompiledPredicate,
    table: &TableSchema,
    alias: &str,
    access: &AccessContext,
    read_only: bool,
) -> QueryResult<CompiledPredicate> {
    AccessAugmenter::new(policy).augment(base, table, alias, access, read_only)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::predicate::count_placeholders;
    use crate::query::schema::ColumnType;

    fn invoice() -> TableSchema {
        TableSchema::builder("C_Invoice")
            .key("C_Invoice_ID")
            .with_standard_columns()
            .column("DocumentNo", ColumnType::Text)
            .build()
            .unwrap()
    }

    fn context() -> AccessContext {
        AccessContext::new("session-1", 102, 11, [0, 11, 12])
    }

    #[test]
    fn scoping_predicates_follow_the_filter() {
        let base = CompiledPredicate::raw("i.DocumentNo = ?", vec!["100".into()]).unwrap();
        let out = augment(&Unrestricted, base, &invoice(), "i", &context(), true).unwrap();
        assert_eq!(
            out.sql(),
            "i.DocumentNo = ? AND i.AD_Client_ID = ? AND i.AD_Org_ID IN (?, ?, ?)"
        );
        assert_eq!(
            out.parameters(),
            &[
                SqlValue::Text("100".to_string()),
                SqlValue::Integer(11),
                SqlValue::Integer(0),
                SqlValue::Integer(11),
                SqlValue::Integer(12),
            ]
        );
    }

    #[test]
    fn record_access_subquery_is_added_for_reads() {
        let out = augment(
            &RecordAccessPolicy,
            CompiledPredicate::default(),
            &invoice(),
            "i",
            &context(),
            true,
        )
        .unwrap();
        assert!(out.sql().contains("i.C_Invoice_ID NOT IN (SELECT ra.Record_ID"));
        assert!(out.sql().contains("ra.IsExclude = 'Y'"));
        assert_eq!(count_placeholders(out.sql()), out.parameters().len());
        let tail = &out.parameters()[out.parameters().len() - 6..];
        let pair = [
            SqlValue::Text("C_Invoice".to_string()),
            SqlValue::Integer(102),
        ];
        assert_eq!(tail, &[pair.clone(), pair.clone(), pair].concat()[..]);
    }

    #[test]
    fn included_records_limit_the_role() {
        let predicate = RecordAccessPolicy
            .access_predicate(&invoice(), "i", 102, true)
            .unwrap()
            .unwrap()
            .compile();
        let sql = predicate.sql();
        assert!(sql.contains("(NOT EXISTS (SELECT ra.Record_ID"));
        assert!(sql.contains("OR i.C_Invoice_ID IN (SELECT ra.Record_ID"));
        assert_eq!(sql.matches("ra.IsExclude = 'N'").count(), 2);
        assert_eq!(count_placeholders(sql), 6);
    }

    #[test]
    fn record_access_is_skipped_when_not_read_only() {
        let out = augment(
            &RecordAccessPolicy,
            CompiledPredicate::default(),
            &invoice(),
            "i",
            &context(),
            false,
        )
        .unwrap();
        assert!(!out.sql().contains("AD_Record_Access"));
    }

    #[test]
    fn write_access_gets_no_record_predicate() {
        assert!(
            RecordAccessPolicy
                .access_predicate(&invoice(), "i", 102, false)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn tables_without_key_get_no_record_predicate() {
        let schema = TableSchema::builder("AD_Session_Log")
            .with_standard_columns()
            .build()
            .unwrap();
        assert!(
            RecordAccessPolicy
                .access_predicate(&schema, "l", 1, true)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn empty_organization_set_is_access_denied() {
        let access = AccessContext::new("s", 7, 11, []);
        let err = augment(
            &Unrestricted,
            CompiledPredicate::default(),
            &invoice(),
            "i",
            &access,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::AccessDenied { role_id: 7 }));
    }

    #[test]
    fn missing_scoping_columns_are_not_referenced() {
        let schema = TableSchema::builder("AD_Reference")
            .key("AD_Reference_ID")
            .column("Name", ColumnType::Text)
            .build()
            .unwrap();
        let out = augment(
            &Unrestricted,
            CompiledPredicate::default(),
            &schema,
            "r",
            &context(),
            true,
        )
        .unwrap();
        assert!(out.is_empty());
    }
}
