//! Catalog queries against `information_schema` and `pg_catalog`.

use tokio_postgres::Client;
use tracing::debug;

use crate::core::traits::{
    CatalogColumn, CatalogIndexColumn, CatalogKeyColumn, CatalogProcedure, CatalogProcedureParam,
    CatalogTable,
};
use crate::error::Result;

pub(crate) async fn tables(client: &Client, schema: &str) -> Result<Vec<CatalogTable>> {
    let query = r#"
        SELECT table_schema::text, table_name::text, table_type::text
        FROM information_schema.tables
        WHERE table_schema = $1
        ORDER BY table_name
    "#;

    let rows = client.query(query, &[&schema]).await?;
    let tables = rows
        .iter()
        .map(|row| CatalogTable {
            schema: row.get(0),
            name: row.get(1),
            table_type: row.get(2),
        })
        .collect::<Vec<_>>();

    debug!("Found {} relations in schema {}", tables.len(), schema);
    Ok(tables)
}

pub(crate) async fn columns(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Vec<CatalogColumn>> {
    let query = r#"
        SELECT
            column_name::text,
            udt_name::text,
            COALESCE(character_maximum_length, numeric_precision, 0)::int4,
            COALESCE(numeric_scale, 0)::int4,
            is_nullable = 'YES',
            is_identity = 'YES' OR COALESCE(column_default LIKE 'nextval(%', false),
            column_default::text
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = $2
        ORDER BY ordinal_position
    "#;

    let rows = client.query(query, &[&schema, &table]).await?;
    Ok(rows
        .iter()
        .map(|row| CatalogColumn {
            name: row.get(0),
            type_name: row.get(1),
            length: row.get(2),
            scale: row.get(3),
            nullable: Some(row.get(4)),
            auto_increment: row.get(5),
            default: row.get(6),
        })
        .collect())
}

pub(crate) async fn primary_key(client: &Client, schema: &str, table: &str) -> Result<Vec<String>> {
    let query = r#"
        SELECT a.attname::text
        FROM pg_catalog.pg_index i
        JOIN pg_catalog.pg_class t ON t.oid = i.indrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(i.indkey)
        WHERE n.nspname = $1
          AND t.relname = $2
          AND i.indisprimary
        ORDER BY array_position(i.indkey, a.attnum)
    "#;

    let rows = client.query(query, &[&schema, &table]).await?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

pub(crate) async fn indexes(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Vec<CatalogIndexColumn>> {
    let query = r#"
        SELECT
            i.relname::text,
            ix.indisunique,
            a.attname::text,
            k.ord::int4
        FROM pg_catalog.pg_index ix
        JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
        JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
        JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        WHERE n.nspname = $1
          AND t.relname = $2
          AND NOT ix.indisprimary
        ORDER BY i.relname, k.ord
    "#;

    let rows = client.query(query, &[&schema, &table]).await?;
    Ok(rows
        .iter()
        .map(|row| CatalogIndexColumn {
            index_name: row.get(0),
            unique: row.get(1),
            column: row.get(2),
            ordinal: row.get(3),
        })
        .collect())
}

pub(crate) async fn exported_keys(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Vec<CatalogKeyColumn>> {
    let query = r#"
        SELECT
            c.conname::text,
            pt.relname::text,
            pa.attname::text,
            ft.relname::text,
            fa.attname::text,
            k.seq::int4
        FROM pg_catalog.pg_constraint c
        JOIN pg_catalog.pg_class pt ON pt.oid = c.confrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = pt.relnamespace
        JOIN pg_catalog.pg_class ft ON ft.oid = c.conrelid
        CROSS JOIN LATERAL unnest(c.conkey, c.confkey) WITH ORDINALITY AS k(fk_attnum, pk_attnum, seq)
        JOIN pg_catalog.pg_attribute fa ON fa.attrelid = ft.oid AND fa.attnum = k.fk_attnum
        JOIN pg_catalog.pg_attribute pa ON pa.attrelid = pt.oid AND pa.attnum = k.pk_attnum
        WHERE n.nspname = $1
          AND pt.relname = $2
          AND c.contype = 'f'
        ORDER BY ft.relname, c.conname, k.seq
    "#;

    let rows = client.query(query, &[&schema, &table]).await?;
    Ok(rows
        .iter()
        .map(|row| CatalogKeyColumn {
            fk_name: row.get(0),
            pk_table: row.get(1),
            pk_column: row.get(2),
            fk_table: row.get(3),
            fk_column: row.get(4),
            key_seq: row.get(5),
        })
        .collect())
}

pub(crate) async fn procedure(
    client: &Client,
    schema: &str,
    name: &str,
) -> Result<Option<CatalogProcedure>> {
    let query = r#"
        SELECT
            p.proname::text,
            p.prokind::text,
            p.proretset,
            pg_catalog.format_type(p.prorettype, NULL),
            COALESCE(p.proargnames, ARRAY[]::text[]),
            COALESCE(p.proargmodes::text[], ARRAY[]::text[]),
            ARRAY(
                SELECT pg_catalog.format_type(t.oid, NULL)
                FROM unnest(COALESCE(p.proallargtypes, p.proargtypes::oid[])) WITH ORDINALITY AS u(oid, ord)
                JOIN pg_catalog.pg_type t ON t.oid = u.oid
                ORDER BY u.ord
            )
        FROM pg_catalog.pg_proc p
        JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
        WHERE n.nspname = $1 AND p.proname = $2
        ORDER BY p.oid
        LIMIT 1
    "#;

    let rows = client.query(query, &[&schema, &name]).await?;
    let Some(row) = rows.first() else {
        return Ok(None);
    };

    let kind: String = row.get(1);
    let returns_set: bool = row.get(2);
    let return_type: String = row.get(3);
    let names: Vec<String> = row.get(4);
    let modes: Vec<String> = row.get(5);
    let types: Vec<String> = row.get(6);

    let params = types
        .iter()
        .enumerate()
        .filter_map(|(i, type_name)| {
            let mode = match modes.get(i).map(String::as_str) {
                Some("o") => "OUT",
                Some("b") => "INOUT",
                // Table columns of RETURNS TABLE are result columns, not parameters.
                Some("t") => return None,
                _ => "IN",
            };
            Some(CatalogProcedureParam {
                name: names
                    .get(i)
                    .filter(|n| !n.is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("${}", i + 1)),
                mode: mode.to_string(),
                type_name: type_name.clone(),
            })
        })
        .collect();

    let return_type = if kind == "p" || return_type == "void" {
        None
    } else {
        Some(return_type)
    };

    Ok(Some(CatalogProcedure {
        name: row.get(0),
        return_type,
        returns_set,
        params,
    }))
}
