use crate::{Error, config::Config};
use log::{error, info, warn};
use rocket::{fairing, Rocket, Build, tokio::fs};
use rocket::serde::Serialize;
use rocket_db_pools::{sqlx::{self, sqlite::SqliteRow, SqliteConnection}, sqlx::Row, Database};


#[derive(Database)]
#[database("regions")]
pub struct RegionsDb(pub sqlx::SqlitePool);


/// A row of the region table, as returned by the lookup API
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub code: String,
    pub name: String,
}


/// Levels of the province/city/area/town hierarchy that can be listed. In the `province` table,
/// a code of '0' means the row doesn't go down to that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionLevel {
    Province,
    City,
    Area,
}

impl RegionLevel {
    /// SQL query listing the regions of this level, with a single placeholder for the province
    /// code unless this is the province level itself
    pub fn sql(&self) -> &'static str {
        match self {
            RegionLevel::Province => "SELECT province, name FROM province WHERE city='0' AND area='0' AND town='0';",
            RegionLevel::City => "SELECT code, name FROM province WHERE province=? AND city!='0' AND area='0' AND town='0';",
            RegionLevel::Area => "SELECT code, name FROM province WHERE province=? AND area!='0' AND town='0';",
        }
    }

    pub fn filtered_by_province(&self) -> bool {
        *self != RegionLevel::Province
    }
}


/// Fairing callback that checks if the database already contains the `province` table and
/// if not, executes the schema file from the config to initialize it
pub async fn init_schema(rocket: Rocket<Build>) -> fairing::Result {
    // Make sure the database has been initialized (fairings have been attached in the correct order)
    let Some(db) = RegionsDb::fetch(&rocket) else {
        return Err(rocket);
    };
    let pool = db.0.clone();
    let schema_path = match rocket.state::<Config>() {
        Some(config) => config.SCHEMA_PATH.clone(),
        None => return Err(rocket),
    };

    // Check the `sqlite_master` table for a table named `province`
    let query_result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='province';")
        .fetch_optional(&pool).await;
    match query_result {
        // The table already exists, we can proceed with liftoff
        Ok(Some(_)) => Ok(rocket),

        // The table doesn't exist, try to import the schema to create it
        Ok(None) => {
            info!("Region table is missing, creating it from \"{}\"", schema_path);
            match fs::read_to_string(&schema_path).await {
                Ok(schema) => {
                    for sql_query in schema_statements(&schema) {
                        if let Err(e) = sqlx::query(sql_query).execute(&pool).await {
                            error!("Unable to execute a query from \"{}\" : {}", schema_path, e);
                            error!("{}", sql_query);
                            return Err(rocket);
                        }
                    }
                    warn!("Region table created empty, it must be filled before lookups return anything");
                    Ok(rocket)
                },
                Err(e) => {
                    error!("Unable to open \"{}\" : {}", schema_path, e);
                    Err(rocket)
                },
            }
        },

        // Something went wrong when checking `sqlite_master`, we'll have to scrub the launch
        Err(e) => {
            error!("Unable to access the region database to check its schema : {}", e);
            Err(rocket)
        }
    }
}


/// Split a schema file into individual, non-empty queries
pub fn schema_statements(schema: &str) -> impl Iterator<Item = &str> {
    schema.split(';').map(|s| s.trim()).filter(|s| !s.is_empty())
}


/// List the regions of the given level, in the table's natural order. The province code is
/// ignored for the province level; a missing or unknown code yields an empty list.
pub async fn list_regions(db_conn: &mut SqliteConnection, level: RegionLevel, province: Option<&str>) -> Result<Vec<Region>, Error> {
    let mut query = sqlx::query(level.sql());
    if level.filtered_by_province() {
        query = query.bind(province);
    }
    query.fetch_all(&mut *db_conn).await
        .map(|rows|
            // Convert the list of rows into a list of Region's, excluding invalid inputs from the result
            rows.iter()
                .filter_map(|row| row_to_region(row).or_else(|e| {
                    warn!("Database error : unable to decode a region : {}", e);
                    Err(e)
                }).ok())
                .collect::<Vec<Region>>()
        )
        .map_err(|e| Error::DatabaseError(e))
}


/// Deserialize an SQL row made of a code and a name into a Region struct
fn row_to_region(row: &SqliteRow) -> Result<Region, sqlx::Error> {
    Ok(Region {
        code: row.try_get(0)?,
        name: row.try_get(1)?,
    })
}


#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rocket_db_pools::sqlx::Connection;

    pub(crate) const SCHEMA: &str = include_str!("../schema.sql");

    /// (code, name, province, city, area, town)
    pub(crate) const BEIJING_TIANJIN: [(&str, &str, &str, &str, &str, &str); 7] = [
        ("110000000000", "北京市", "11", "0", "0", "0"),
        ("110100000000", "市辖区", "11", "01", "0", "0"),
        ("110101000000", "东城区", "11", "01", "01", "0"),
        ("110102000000", "西城区", "11", "01", "02", "0"),
        ("110101001000", "东华门街道", "11", "01", "01", "001"),
        ("120000000000", "天津市", "12", "0", "0", "0"),
        ("120101000000", "和平区", "12", "01", "01", "0"),
    ];

    /// Create the region table in the given connection and fill it with a few rows
    pub(crate) async fn seed(conn: &mut SqliteConnection) {
        for statement in schema_statements(SCHEMA) {
            sqlx::query(statement).execute(&mut *conn).await.unwrap();
        }
        for (code, name, province, city, area, town) in BEIJING_TIANJIN {
            sqlx::query("INSERT INTO province(code, name, province, city, area, town) VALUES (?, ?, ?, ?, ?, ?);")
                .bind(code).bind(name).bind(province).bind(city).bind(area).bind(town)
                .execute(&mut *conn).await.unwrap();
        }
    }

    async fn seeded() -> SqliteConnection {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        seed(&mut conn).await;
        conn
    }

    fn region(code: &str, name: &str) -> Region {
        Region { code: code.to_string(), name: name.to_string() }
    }

    #[rocket::async_test]
    async fn provinces_use_the_province_code() {
        let mut conn = seeded().await;
        let provinces = list_regions(&mut conn, RegionLevel::Province, None).await.unwrap();
        assert_eq!(provinces, vec![region("11", "北京市"), region("12", "天津市")]);

        // The province code is not used at this level
        let provinces = list_regions(&mut conn, RegionLevel::Province, Some("12")).await.unwrap();
        assert_eq!(provinces.len(), 2);
    }

    #[rocket::async_test]
    async fn cities_exclude_the_province_itself() {
        let mut conn = seeded().await;
        let cities = list_regions(&mut conn, RegionLevel::City, Some("11")).await.unwrap();
        assert_eq!(cities, vec![region("110100000000", "市辖区")]);
        assert!(!cities.iter().any(|c| c.name == "北京市"));
    }

    #[rocket::async_test]
    async fn areas_exclude_towns() {
        let mut conn = seeded().await;
        let areas = list_regions(&mut conn, RegionLevel::Area, Some("11")).await.unwrap();
        assert_eq!(areas, vec![region("110101000000", "东城区"), region("110102000000", "西城区")]);
    }

    #[rocket::async_test]
    async fn unknown_or_missing_province_is_empty() {
        let mut conn = seeded().await;
        assert!(list_regions(&mut conn, RegionLevel::City, Some("99")).await.unwrap().is_empty());
        assert!(list_regions(&mut conn, RegionLevel::City, None).await.unwrap().is_empty());
        assert!(list_regions(&mut conn, RegionLevel::Area, Some("11' OR '1'='1")).await.unwrap().is_empty());
    }

    #[test]
    fn schema_is_split_into_statements() {
        let statements: Vec<&str> = schema_statements("CREATE TABLE a(x);\n\n  ;CREATE INDEX b ON a(x);\n").collect();
        assert_eq!(statements, vec!["CREATE TABLE a(x)", "CREATE INDEX b ON a(x)"]);
        assert!(schema_statements(SCHEMA).count() >= 1);
    }
}
