use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{parse_uuid, DatabaseError};
use crate::models::*;

pub fn insert_plan(conn: &Connection, plan: &InsurancePlan) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO insurance_plans (id, name, consultation_default, drugs_default,
         labs_default, procedures_default)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            plan.id.to_string(),
            plan.name,
            plan.consultation_default,
            plan.drugs_default,
            plan.labs_default,
            plan.procedures_default,
        ],
    )?;
    Ok(())
}

pub fn get_plan(conn: &Connection, plan_id: &Uuid) -> Result<Option<InsurancePlan>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, consultation_default, drugs_default, labs_default, procedures_default
         FROM insurance_plans WHERE id = ?1",
    )?;
    let mut rows = stmt.query_map(params![plan_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<f64>>(2)?,
            row.get::<_, Option<f64>>(3)?,
            row.get::<_, Option<f64>>(4)?,
            row.get::<_, Option<f64>>(5)?,
        ))
    })?;

    match rows.next() {
        Some(row) => {
            let (id, name, consultation, drugs, labs, procedures) = row?;
            Ok(Some(InsurancePlan {
                id: parse_uuid("insurance_plans.id", &id)?,
                name,
                consultation_default: consultation,
                drugs_default: drugs,
                labs_default: labs,
                procedures_default: procedures,
            }))
        }
        None => Ok(None),
    }
}
