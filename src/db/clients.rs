//! Client profiles.

use super::Database;
use anyhow::{Context, Result};
use uuid::Uuid;

use crate::model::Client;
use crate::ClientDirectory;

#[derive(Debug, sqlx::FromRow)]
pub struct ClientRow {
    pub client_id: Uuid,
    pub age: i32,
    pub location: String,
    pub gender: String,
}

impl TryFrom<ClientRow> for Client {
    type Error = anyhow::Error;

    fn try_from(row: ClientRow) -> Result<Self> {
        Ok(Client {
            client_id: row.client_id,
            age: row.age,
            location: row.location,
            gender: row
                .gender
                .parse()
                .with_context(|| format!("client {}", row.client_id))?,
        })
    }
}

impl Database {
    pub async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>> {
        let row = sqlx::query_as::<_, ClientRow>(
            "SELECT client_id, age, location, gender FROM clients WHERE client_id = $1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Client::try_from).transpose()
    }

    pub async fn upsert_client(&self, client: &Client) -> Result<()> {
        sqlx::query(
            "INSERT INTO clients (client_id, age, location, gender)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (client_id) DO UPDATE SET
               age = EXCLUDED.age, location = EXCLUDED.location, gender = EXCLUDED.gender",
        )
        .bind(client.client_id)
        .bind(client.age)
        .bind(&client.location)
        .bind(client.gender.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl ClientDirectory for Database {
    async fn get_client(&self, id: Uuid) -> Result<Option<Client>> {
        Database::get_client(self, id).await
    }

    async fn upsert_client(&self, client: &Client) -> Result<()> {
        Database::upsert_client(self, client).await
    }
}
