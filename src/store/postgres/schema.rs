use tokio_postgres::Client;

use super::operations;
use crate::store::StoreError;

const NAME: &str = "tz";
const REV_MAJOR: i32 = 1;
const REV_MINOR: i32 = 0;

#[derive(Debug, PartialEq, Eq)]
struct Revision {
    pub major: i32,
    pub minor: i32,
}

/// Creates the schema if missing and checks its revision.
pub(super) async fn init(client: &mut Client) -> Result<(), StoreError> {
    if !schema_exists(client).await? {
        load_schema(client).await?;
    }
    let rev = schema_revision(client).await?;
    let expected = Revision {
        major: REV_MAJOR,
        minor: REV_MINOR,
    };
    if rev != expected {
        return Err(StoreError::Corrupt(format!(
            "unsupported schema revision {}.{}, expected {}.{}",
            rev.major, rev.minor, expected.major, expected.minor
        )));
    }
    Ok(())
}

async fn schema_revision(client: &Client) -> Result<Revision, StoreError> {
    tracing::debug!("reading current revision");
    let qry = format!("select rev_major, rev_minor from {NAME}._rev;");
    let row = client.query_one(&qry, &[]).await?;
    Ok(Revision {
        major: row.get(0),
        minor: row.get(1),
    })
}

async fn schema_exists(client: &Client) -> Result<bool, StoreError> {
    tracing::debug!("checking for existing schema");
    let qry = "
        select exists(
            select schema_name
            from information_schema.schemata
            where schema_name = $1
        );";
    Ok(client.query_one(qry, &[&NAME]).await?.get(0))
}

async fn load_schema(client: &mut Client) -> Result<(), StoreError> {
    tracing::debug!("loading schema");
    let tx = client.transaction().await?;
    tx.batch_execute(include_str!("schema.sql")).await?;
    tx.batch_execute(&operations::ddl()).await?;
    tx.commit().await?;
    Ok(())
}
