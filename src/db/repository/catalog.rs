use std::str::FromStr;

use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::enums::CoverageCategory;
use crate::models::*;

/// Insert or refresh a priced catalog item.
pub fn upsert_catalog_item(conn: &Connection, item: &CatalogItem) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO catalog_items (category, item_code, item_name, current_price)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (category, item_code)
         DO UPDATE SET item_name = excluded.item_name, current_price = excluded.current_price",
        params![
            item.category.as_str(),
            item.item_code,
            item.item_name,
            item.current_price,
        ],
    )?;
    Ok(())
}

pub fn catalog_item_exists(
    conn: &Connection,
    category: CoverageCategory,
    item_code: &str,
) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM catalog_items WHERE category = ?1 AND item_code = ?2",
        params![category.as_str(), item_code],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Catalog items of one category ordered by code.
pub fn get_catalog_items(
    conn: &Connection,
    category: CoverageCategory,
) -> Result<Vec<CatalogItem>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT category, item_code, item_name, current_price
         FROM catalog_items WHERE category = ?1 ORDER BY item_code",
    )?;
    let rows = stmt.query_map(params![category.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, f64>(3)?,
        ))
    })?;

    let mut items = Vec::new();
    for row in rows {
        let (category, item_code, item_name, current_price) = row?;
        items.push(CatalogItem {
            category: CoverageCategory::from_str(&category)?,
            item_code,
            item_name,
            current_price,
        });
    }
    Ok(items)
}
