//! Additional field values
//!
//! Generic key/value metadata attached to any parent record. Rows are
//! searchable by parent and field; writes are limited to [`WRITE_ROLES`].

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::{ModelError, Result};

/// Roles allowed to create, patch or delete values
pub const WRITE_ROLES: &[&str] = &["Administrator", "Transmission SME"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "PascalCase")]
pub struct AdditionalFieldValue {
    #[sqlx(rename = "ID")]
    #[serde(rename = "ID")]
    pub id: i64,
    #[sqlx(rename = "ParentTableID")]
    #[serde(rename = "ParentTableID")]
    pub parent_table_id: i64,
    #[sqlx(rename = "AdditionalFieldID")]
    #[serde(rename = "AdditionalFieldID")]
    pub additional_field_id: i64,
    #[sqlx(rename = "Value")]
    pub value: Option<String>,
}

/// Insert payload; the id is assigned by the database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewAdditionalFieldValue {
    #[serde(rename = "ParentTableID")]
    pub parent_table_id: i64,
    #[serde(rename = "AdditionalFieldID")]
    pub additional_field_id: i64,
    #[serde(rename = "Value", default)]
    pub value: Option<String>,
}

/// Patch payload; absent fields are left unchanged
///
/// `Value` distinguishes absent (`None`) from an explicit `null`
/// (`Some(None)`), which clears the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AdditionalFieldValuePatch {
    #[serde(rename = "ParentTableID", default)]
    pub parent_table_id: Option<i64>,
    #[serde(rename = "AdditionalFieldID", default)]
    pub additional_field_id: Option<i64>,
    #[serde(
        rename = "Value",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub value: Option<Option<String>>,
}

/// Wrap whatever was sent, `null` included, so absence stays `None`
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Search filter; `None` matches everything
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdditionalFieldValueFilter {
    pub parent_table_id: Option<i64>,
    pub additional_field_id: Option<i64>,
}

/// Whether any of `roles` may write additional field values
pub fn is_write_permitted<'a, I>(roles: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    roles
        .into_iter()
        .any(|role| WRITE_ROLES.iter().any(|w| w.eq_ignore_ascii_case(role.trim())))
}

const SELECT_COLUMNS: &str = "SELECT ID, ParentTableID, AdditionalFieldID, Value FROM AdditionalFieldValue";

pub async fn search(
    pool: &SqlitePool,
    filter: &AdditionalFieldValueFilter,
) -> Result<Vec<AdditionalFieldValue>> {
    let sql = format!(
        "{} WHERE (?1 IS NULL OR ParentTableID = ?1) AND (?2 IS NULL OR AdditionalFieldID = ?2) ORDER BY ID",
        SELECT_COLUMNS
    );
    let rows = sqlx::query_as::<_, AdditionalFieldValue>(&sql)
        .bind(filter.parent_table_id)
        .bind(filter.additional_field_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<AdditionalFieldValue> {
    let sql = format!("{} WHERE ID = ?", SELECT_COLUMNS);
    sqlx::query_as::<_, AdditionalFieldValue>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ModelError::not_found(format!("AdditionalFieldValue {}", id)))
}

pub async fn insert(
    pool: &SqlitePool,
    value: &NewAdditionalFieldValue,
) -> Result<AdditionalFieldValue> {
    let result = sqlx::query(
        "INSERT INTO AdditionalFieldValue (ParentTableID, AdditionalFieldID, Value) VALUES (?, ?, ?)",
    )
    .bind(value.parent_table_id)
    .bind(value.additional_field_id)
    .bind(value.value.as_deref())
    .execute(pool)
    .await?;

    get(pool, result.last_insert_rowid()).await
}

pub async fn update(
    pool: &SqlitePool,
    id: i64,
    patch: &AdditionalFieldValuePatch,
) -> Result<AdditionalFieldValue> {
    let result = sqlx::query(
        r#"
        UPDATE AdditionalFieldValue
        SET ParentTableID = COALESCE(?1, ParentTableID),
            AdditionalFieldID = COALESCE(?2, AdditionalFieldID),
            Value = CASE WHEN ?3 THEN ?4 ELSE Value END
        WHERE ID = ?5
        "#,
    )
    .bind(patch.parent_table_id)
    .bind(patch.additional_field_id)
    .bind(patch.value.is_some())
    .bind(patch.value.clone().flatten())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ModelError::not_found(format!("AdditionalFieldValue {}", id)));
    }
    get(pool, id).await
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM AdditionalFieldValue WHERE ID = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ModelError::not_found(format!("AdditionalFieldValue {}", id)));
    }
    Ok(())
}
