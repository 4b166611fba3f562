use anyhow::Context as _;
use sea_orm::sea_query::{
    Alias, Asterisk, ColumnDef, Expr, Func, OnConflict, Order, Query, SelectStatement, Table,
    TableCreateStatement,
};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, FromQueryResult, Statement, StatementBuilder,
    TransactionTrait,
};
use serde::Serialize;

use super::allocator::{ClaimOutcome, InviteStore};
use super::csv::{is_valid_code, parse_pool_csv};
use super::tenant::Tenant;
use crate::error::AppError;
use crate::models::now_string;

/// Free codes one claim walks through before reporting contention.
const CLAIM_WINDOW: u64 = 16;

fn col(name: &'static str) -> Alias {
    Alias::new(name)
}

fn stmt<C: ConnectionTrait, S: StatementBuilder>(conn: &C, s: &S) -> Statement {
    conn.get_database_backend().build(s)
}

/// DDL for the three tables of `tenant`.
pub fn tenant_tables(tenant: Tenant) -> Vec<TableCreateStatement> {
    let id = || {
        ColumnDef::new(col("id"))
            .integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned()
    };

    let codes = Table::create()
        .table(col(tenant.codes_table()))
        .if_not_exists()
        .col(id())
        .col(ColumnDef::new(col("code")).text().not_null().unique_key())
        .col(ColumnDef::new(col("created_at")).text().not_null())
        .to_owned();

    let assignments = Table::create()
        .table(col(tenant.assignments_table()))
        .if_not_exists()
        .col(id())
        .col(ColumnDef::new(col(tenant.key_column())).text().not_null().unique_key())
        .col(ColumnDef::new(col("invite_code")).text().not_null().unique_key())
        .col(ColumnDef::new(col(tenant.meta_column())).text().null())
        .col(ColumnDef::new(col("assigned_at")).text().not_null())
        .to_owned();

    let usage = Table::create()
        .table(col(tenant.usage_table()))
        .if_not_exists()
        .col(id())
        .col(ColumnDef::new(col("invite_code")).text().not_null().unique_key())
        .col(ColumnDef::new(col("player_name")).text().null())
        .col(ColumnDef::new(col("used_at")).text().not_null())
        .to_owned();

    vec![codes, assignments, usage]
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub inserted: u64,
    pub skipped: u64,
    pub usage_recorded: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeStats {
    pub total_codes: i64,
    pub assigned_codes: i64,
    pub used_codes: i64,
    pub available_codes: i64,
}

/// One pool code joined with its assignment and usage, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct CodeStatus {
    pub code: String,
    pub created_at: String,
    pub assigned_to: Option<String>,
    pub assignee_meta: Option<String>,
    pub assigned_at: Option<String>,
    pub used_by: Option<String>,
    pub used_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRecord {
    pub requester: String,
    pub code: String,
    pub meta: Option<String>,
    pub assigned_at: String,
}

/// Invite pool stored in the tenant's tables.
#[derive(Clone)]
pub struct DbInviteStore {
    db: DatabaseConnection,
    tenant: Tenant,
}

impl DbInviteStore {
    pub fn new(db: DatabaseConnection, tenant: Tenant) -> Self {
        Self { db, tenant }
    }

    pub fn tenant(&self) -> Tenant {
        self.tenant
    }

    fn free_code_query(&self) -> SelectStatement {
        let t = self.tenant;
        Query::select()
            .column(col("code"))
            .from(col(t.codes_table()))
            .and_where(
                Expr::col(col("code")).not_in_subquery(
                    Query::select()
                        .column(col("invite_code"))
                        .from(col(t.assignments_table()))
                        .to_owned(),
                ),
            )
            .and_where(
                Expr::col(col("code")).not_in_subquery(
                    Query::select()
                        .column(col("invite_code"))
                        .from(col(t.usage_table()))
                        .to_owned(),
                ),
            )
            .to_owned()
    }

    async fn count<C: ConnectionTrait>(&self, conn: &C, query: SelectStatement) -> Result<i64, AppError> {
        let query = Query::select()
            .expr_as(Func::count(Expr::col(Asterisk)), col("n"))
            .from_subquery(query, col("q"))
            .to_owned();
        let row = conn
            .query_one(stmt(conn, &query))
            .await?
            .context("count query returned no row")?;
        Ok(row.try_get::<i64>("", "n")?)
    }

    async fn code_exists<C: ConnectionTrait>(&self, conn: &C, code: &str) -> Result<bool, AppError> {
        let query = Query::select()
            .column(col("code"))
            .from(col(self.tenant.codes_table()))
            .and_where(Expr::col(col("code")).eq(code))
            .to_owned();
        Ok(conn.query_one(stmt(conn, &query)).await?.is_some())
    }

    async fn insert_code<C: ConnectionTrait>(&self, conn: &C, code: &str, now: &str) -> Result<bool, AppError> {
        let insert = Query::insert()
            .into_table(col(self.tenant.codes_table()))
            .columns([col("code"), col("created_at")])
            .values_panic([code.into(), now.into()])
            .on_conflict(OnConflict::column(col("code")).do_nothing().to_owned())
            .to_owned();
        let res = conn.execute(stmt(conn, &insert)).await?;
        Ok(res.rows_affected() > 0)
    }

    async fn upsert_usage<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        player_name: Option<&str>,
        now: &str,
    ) -> Result<(), AppError> {
        let insert = Query::insert()
            .into_table(col(self.tenant.usage_table()))
            .columns([col("invite_code"), col("player_name"), col("used_at")])
            .values_panic([code.into(), player_name.map(str::to_owned).into(), now.into()])
            .on_conflict(
                OnConflict::column(col("invite_code"))
                    .update_columns([col("player_name"), col("used_at")])
                    .to_owned(),
            )
            .to_owned();
        conn.execute(stmt(conn, &insert)).await?;
        Ok(())
    }

    /// Bulk-load a `code,consumer_player` CSV. Codes that already exist or
    /// fail validation are skipped; a consumer marks the code as used.
    pub async fn import_csv(&self, text: &str) -> Result<ImportSummary, AppError> {
        let rows = parse_pool_csv(text);
        if rows.is_empty() {
            return Err(AppError::validation("CSV contains no codes"));
        }

        let now = now_string();
        let txn = self.db.begin().await?;
        let mut summary = ImportSummary::default();
        for row in rows {
            if !is_valid_code(&row.code) {
                tracing::warn!(tenant = %self.tenant, code = %row.code, "skipping invalid code in CSV");
                summary.skipped += 1;
                continue;
            }
            if self.insert_code(&txn, &row.code, &now).await? {
                summary.inserted += 1;
            } else {
                summary.skipped += 1;
            }
            if let Some(player) = row.consumer.as_deref() {
                self.upsert_usage(&txn, &row.code, Some(player), &now).await?;
                summary.usage_recorded += 1;
            }
        }
        txn.commit().await?;

        tracing::info!(
            tenant = %self.tenant,
            inserted = summary.inserted,
            skipped = summary.skipped,
            usage = summary.usage_recorded,
            "imported invite codes"
        );
        Ok(summary)
    }

    pub async fn add_code(&self, code: &str) -> Result<(), AppError> {
        let code = code.trim();
        if !is_valid_code(code) {
            return Err(AppError::validation("invalid invite code"));
        }
        if !self.insert_code(&self.db, code, &now_string()).await? {
            return Err(AppError::conflict("invite code already exists"));
        }
        tracing::info!(tenant = %self.tenant, code, "invite code added");
        Ok(())
    }

    pub async fn list_codes(&self) -> Result<Vec<CodeStatus>, AppError> {
        let t = self.tenant;
        let codes = col(t.codes_table());
        let assign = col(t.assignments_table());
        let usage = col(t.usage_table());

        let query = Query::select()
            .expr_as(Expr::col((codes.clone(), col("code"))), col("code"))
            .expr_as(Expr::col((codes.clone(), col("created_at"))), col("created_at"))
            .expr_as(Expr::col((assign.clone(), col(t.key_column()))), col("assigned_to"))
            .expr_as(Expr::col((assign.clone(), col(t.meta_column()))), col("assignee_meta"))
            .expr_as(Expr::col((assign.clone(), col("assigned_at"))), col("assigned_at"))
            .expr_as(Expr::col((usage.clone(), col("player_name"))), col("used_by"))
            .expr_as(Expr::col((usage.clone(), col("used_at"))), col("used_at"))
            .from(codes.clone())
            .left_join(
                assign.clone(),
                Expr::col((assign.clone(), col("invite_code"))).equals((codes.clone(), col("code"))),
            )
            .left_join(
                usage.clone(),
                Expr::col((usage, col("invite_code"))).equals((codes.clone(), col("code"))),
            )
            .order_by((codes, col("id")), Order::Asc)
            .to_owned();

        Ok(CodeStatus::find_by_statement(stmt(&self.db, &query))
            .all(&self.db)
            .await?)
    }

    /// Remove one code together with its assignment and usage rows.
    pub async fn delete_code(&self, code: &str) -> Result<(), AppError> {
        let t = self.tenant;
        let txn = self.db.begin().await?;
        for table in [t.usage_table(), t.assignments_table()] {
            let delete = Query::delete()
                .from_table(col(table))
                .and_where(Expr::col(col("invite_code")).eq(code))
                .to_owned();
            txn.execute(stmt(&txn, &delete)).await?;
        }
        let delete = Query::delete()
            .from_table(col(t.codes_table()))
            .and_where(Expr::col(col("code")).eq(code))
            .to_owned();
        if txn.execute(stmt(&txn, &delete)).await?.rows_affected() == 0 {
            return Err(AppError::NotFound("invite code"));
        }
        txn.commit().await?;
        tracing::info!(tenant = %t, code, "invite code deleted");
        Ok(())
    }

    /// Wipe the tenant's pool. Returns how many codes were removed.
    pub async fn clear_all(&self) -> Result<u64, AppError> {
        let t = self.tenant;
        let txn = self.db.begin().await?;
        for table in [t.usage_table(), t.assignments_table()] {
            let delete = Query::delete().from_table(col(table)).to_owned();
            txn.execute(stmt(&txn, &delete)).await?;
        }
        let delete = Query::delete().from_table(col(t.codes_table())).to_owned();
        let removed = txn.execute(stmt(&txn, &delete)).await?.rows_affected();
        txn.commit().await?;
        tracing::warn!(tenant = %t, removed, "invite pool cleared");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<CodeStats, AppError> {
        let t = self.tenant;
        let all = |table: &'static str| Query::select().column(Asterisk).from(col(table)).to_owned();
        Ok(CodeStats {
            total_codes: self.count(&self.db, all(t.codes_table())).await?,
            assigned_codes: self.count(&self.db, all(t.assignments_table())).await?,
            used_codes: self.count(&self.db, all(t.usage_table())).await?,
            available_codes: self.count(&self.db, self.free_code_query()).await?,
        })
    }

    /// Mark a pool code as redeemed by `player_name`. Re-recording
    /// overwrites the player and timestamp.
    pub async fn record_usage(&self, code: &str, player_name: Option<&str>) -> Result<(), AppError> {
        if !self.code_exists(&self.db, code).await? {
            return Err(AppError::NotFound("invite code"));
        }
        self.upsert_usage(&self.db, code, player_name, &now_string()).await?;
        tracing::info!(tenant = %self.tenant, code, player = ?player_name, "invite code usage recorded");
        Ok(())
    }

    pub async fn lookup(&self, key: &str) -> Result<Option<AssignmentRecord>, AppError> {
        let t = self.tenant;
        let query = Query::select()
            .expr_as(Expr::col(col(t.key_column())), col("requester"))
            .expr_as(Expr::col(col("invite_code")), col("code"))
            .expr_as(Expr::col(col(t.meta_column())), col("meta"))
            .column(col("assigned_at"))
            .from(col(t.assignments_table()))
            .and_where(Expr::col(col(t.key_column())).eq(key))
            .to_owned();
        Ok(AssignmentRecord::find_by_statement(stmt(&self.db, &query))
            .one(&self.db)
            .await?)
    }
}

impl InviteStore for DbInviteStore {
    async fn find_assignment(&self, key: &str) -> Result<Option<String>, AppError> {
        let t = self.tenant;
        let query = Query::select()
            .column(col("invite_code"))
            .from(col(t.assignments_table()))
            .and_where(Expr::col(col(t.key_column())).eq(key))
            .to_owned();
        match self.db.query_one(stmt(&self.db, &query)).await? {
            Some(row) => Ok(Some(row.try_get::<String>("", "invite_code")?)),
            None => Ok(None),
        }
    }

    async fn try_claim(&self, key: &str, meta: Option<&str>) -> Result<ClaimOutcome, AppError> {
        let t = self.tenant;
        let window = self
            .free_code_query()
            .order_by(col("id"), Order::Asc)
            .limit(CLAIM_WINDOW)
            .to_owned();
        let candidates = self.db.query_all(stmt(&self.db, &window)).await?;
        if candidates.is_empty() {
            return Ok(ClaimOutcome::Exhausted);
        }

        for row in candidates {
            let code = row.try_get::<String>("", "code")?;
            // Both the key and the code are unique; losing either race is a no-op.
            let insert = Query::insert()
                .into_table(col(t.assignments_table()))
                .columns([
                    col(t.key_column()),
                    col("invite_code"),
                    col(t.meta_column()),
                    col("assigned_at"),
                ])
                .values_panic([
                    key.into(),
                    code.clone().into(),
                    meta.map(str::to_owned).into(),
                    now_string().into(),
                ])
                .on_conflict(OnConflict::new().do_nothing().to_owned())
                .to_owned();
            if self.db.execute(stmt(&self.db, &insert)).await?.rows_affected() > 0 {
                return Ok(ClaimOutcome::Claimed(code));
            }
            if self.find_assignment(key).await?.is_some() {
                // a concurrent request for the same key got there first
                return Ok(ClaimOutcome::Contended);
            }
            tracing::debug!(tenant = %t, code = %code, "candidate taken, trying the next one");
        }

        // every candidate in the window went to someone else
        Ok(ClaimOutcome::Contended)
    }
}
