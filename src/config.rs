use crate::Error;
use std::{fs, io, path::PathBuf};
use std::path::Path;
use rocket::figment::Figment;
use rocket::serde::{Serialize, Deserialize};
use toml::value::Table;


/// Name of the main config file in the app's folder
pub const FILENAME: &'static str = "snapshelf.config";

/// Name of the region database, as registered with rocket_db_pools
pub const REGIONS_DATABASE: &'static str = "regions";


/// The app's config, shared by the gallery and the region services
#[allow(non_snake_case)]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// IP address to serve on.
    /// Default : 127.0.0.1
    #[serde(default="config_default_address")]
    pub ADDRESS: String,

    /// Port the gallery service listens on.
    /// Default : 8000
    #[serde(default="config_default_port")]
    pub PORT: u16,

    /// Port the region lookup service listens on.
    /// Default : 8001
    #[serde(default="config_default_regions_port")]
    pub REGIONS_PORT: u16,

    /// Title displayed in the page title and the header of both pages.
    #[serde(default="config_default_title")]
    pub TITLE: String,

    /// Rocket's log level : `off`, `critical`, `normal` or `debug`.
    /// Default : normal
    #[serde(default="config_default_log_level")]
    pub LOG_LEVEL: String,

    /// Path to the Tera templates directory.
    /// Default : "templates" in the app's folder
    #[serde(default="config_default_templates_dir")]
    pub TEMPLATES_DIR: String,

    /// Path to the directory served under `/static`.
    /// Default : "static" in the app's folder
    #[serde(default="config_default_static_dir")]
    pub STATIC_DIR: String,

    /// Name of the subdirectory of STATIC_DIR where uploaded photos are saved.
    /// Write access is required.
    /// Default : "photos"
    #[serde(default="config_default_upload_subdir")]
    pub UPLOAD_SUBDIR: String,

    /// Path to the JSON file holding the photos metadata.
    /// Default : "metadata.json" in the app's folder
    #[serde(default="config_default_metadata_path")]
    pub METADATA_PATH: String,

    /// Location stored when the uploader didn't provide one. Photos with this
    /// location only show up when searching for this exact string.
    /// Default : "unknown location"
    #[serde(default="config_default_unknown_location")]
    pub UNKNOWN_LOCATION: String,

    /// File extensions accepted for uploads (case-insensitive).
    /// Default : png, jpg, jpeg, gif
    #[serde(default="config_default_allowed_extensions")]
    pub ALLOWED_EXTENSIONS: Vec<String>,

    /// If enabled, the capture time will be read from the EXIF metadata of
    /// uploaded photos when available.
    /// Default : true
    #[serde(default="config_default_true")]
    pub READ_EXIF: bool,

    /// Maximum size of an uploaded file, in MiB.
    /// Default : 32
    #[serde(default="config_default_max_upload_size_mb")]
    pub MAX_UPLOAD_SIZE_MB: u64,

    /// Path to the SQLite database holding the `province` table.
    /// Default : "china_region.sqlite" in the app's folder
    #[serde(default="config_default_database_path")]
    pub DATABASE_PATH: String,

    /// SQL file executed when the `province` table doesn't exist yet.
    /// Default : "schema.sql" in the app's folder
    #[serde(default="config_default_schema_path")]
    pub SCHEMA_PATH: String,
}

impl Config {

    /// Return a Config struct with every key set to its default value
    pub fn defaults() -> Result<Self, Error> {
        Ok(Self::from_table(Table::new())?)
    }

    /// Deserialize a TOML Table into a Config struct
    pub fn from_table(table: Table) -> Result<Self, toml::de::Error> {
        toml::Value::Table(table).try_into::<Self>()
    }

    /// Read the main config file and deserialize it into a Config struct
    pub fn read() -> Result<Self, Error> {
        Self::read_path(FILENAME)
    }

    /// Read the config file at the given location and deserialize it into a Config struct
    pub fn read_path<P>(path: P) -> Result<Self, Error>
        where P: AsRef<Path>
    {
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::FileError(e, PathBuf::from(path.as_ref())))?;
        Ok(toml::from_str(content.as_str())?)
    }

    /// Try to read and parse the config file, falling back to the default values if it doesn't exist
    /// In case of any other error, print it to stderr and exit with a status code of -1
    pub fn read_or_exit() -> Self {
        Self::read()
            .or_else(|e| match e {
                Error::FileError(error, path) if error.kind() == io::ErrorKind::NotFound => {
                    eprintln!("Warning : config file \"{}\" not found, using default values", path.display());
                    Self::defaults()
                }
                e => Err(e),
            })
            .unwrap_or_else(|e| match e {
                Error::FileError(error, path) => {
                    eprintln!("Error, unable to open the config file \"{}\" : {}", path.display(), error);
                    std::process::exit(-1);
                }
                Error::TomlParserError(error) => {
                    eprintln!("Error, unable to parse the config file \"{}\" : {}", FILENAME, error);
                    std::process::exit(-1);
                }
                _ => std::process::exit(-1),
            })
    }

    /// Directory where uploaded photos are saved
    pub fn upload_dir(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.STATIC_DIR);
        path.push(&self.UPLOAD_SUBDIR);
        path
    }

    /// Public URL of an uploaded photo
    pub fn upload_url(&self, filename: &str) -> String {
        format!("/static/{}/{}", self.UPLOAD_SUBDIR.trim_matches('/'), filename)
    }

    /// Build the Rocket figment for a service listening on the given port
    pub fn figment(&self, port: u16) -> Figment {
        let upload_limit = format!("{} MiB", self.MAX_UPLOAD_SIZE_MB);
        rocket::Config::figment()
            .merge(("address", &self.ADDRESS))
            .merge(("port", port))
            .merge(("log_level", &self.LOG_LEVEL))
            .merge(("template_dir", &self.TEMPLATES_DIR))
            .merge(("limits.file", &upload_limit))
            .merge(("limits.data-form", &upload_limit))
            .merge((format!("databases.{}.url", REGIONS_DATABASE), &self.DATABASE_PATH))
    }

}


// Default values for config keys

fn config_default_address() -> String {
    "127.0.0.1".to_string()
}

fn config_default_port() -> u16 {
    8000
}

fn config_default_regions_port() -> u16 {
    8001
}

fn config_default_title() -> String {
    "Snapshelf".to_string()
}

fn config_default_log_level() -> String {
    "normal".to_string()
}

fn config_default_templates_dir() -> String {
    "templates".to_string()
}

fn config_default_static_dir() -> String {
    "static".to_string()
}

fn config_default_upload_subdir() -> String {
    "photos".to_string()
}

fn config_default_metadata_path() -> String {
    "metadata.json".to_string()
}

fn config_default_unknown_location() -> String {
    "unknown location".to_string()
}

fn config_default_allowed_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif"].iter().map(|s| s.to_string()).collect()
}

fn config_default_true() -> bool {
    true
}

fn config_default_max_upload_size_mb() -> u64 {
    32 // MiB
}

fn config_default_database_path() -> String {
    "china_region.sqlite".to_string()
}

fn config_default_schema_path() -> String {
    "schema.sql".to_string()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.PORT, 8000);
        assert_eq!(config.REGIONS_PORT, 8001);
        assert_eq!(config.UNKNOWN_LOCATION, "unknown location");
        assert_eq!(config.ALLOWED_EXTENSIONS, vec!["png", "jpg", "jpeg", "gif"]);
        assert!(config.READ_EXIF);
    }

    #[test]
    fn keys_override_defaults() {
        let config: Config = toml::from_str(r#"
            PORT = 5000
            UNKNOWN_LOCATION = "未知地点"
            READ_EXIF = false
        "#).unwrap();
        assert_eq!(config.PORT, 5000);
        assert_eq!(config.UNKNOWN_LOCATION, "未知地点");
        assert!(!config.READ_EXIF);
        assert_eq!(config.METADATA_PATH, "metadata.json");
    }

    #[test]
    fn upload_paths() {
        let config = Config::defaults().unwrap();
        assert_eq!(config.upload_dir(), PathBuf::from("static/photos"));
        assert_eq!(config.upload_url("1700000000_a.jpg"), "/static/photos/1700000000_a.jpg");
    }

    #[test]
    fn figment_carries_port_and_limits() {
        use rocket::data::ToByteUnit;
        let config = Config::defaults().unwrap();
        let rocket_config: rocket::Config = config.figment(8001).extract().unwrap();
        assert_eq!(rocket_config.port, 8001);
        assert_eq!(rocket_config.limits.get("file"), Some(32.mebibytes()));
    }

    #[test]
    fn missing_file_is_a_file_error() {
        match Config::read_path("does/not/exist.config") {
            Err(Error::FileError(error, _)) => assert_eq!(error.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected result : {:?}", other.map(|c| c.PORT)),
        }
    }
}
