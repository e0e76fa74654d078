use crate::config::Config;
use crate::store::{MetadataStore, PhotoRecord};
use crate::query::PhotoQuery;
use crate::{capture_time, upload, Error};
use std::io;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use rocket::{Build, Rocket, State};
use rocket::form::Form;
use rocket::fs::{FileServer, TempFile};
use rocket::http::Status;
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::tokio::{fs, task};
use rocket_dyn_templates::{Template, context};


/// Build the gallery service : make sure the upload directory and the metadata file exist,
/// then mount the routes
pub async fn build(config: Config) -> Result<Rocket<Build>, Error> {
    let store = MetadataStore::new(&config.METADATA_PATH);
    prepare_storage(&config, &store).await?;

    Ok(rocket::custom(config.figment(config.PORT))
        .mount("/", routes![
            index,
            upload_photo,
            upload_without_form,
            get_photos,
        ])
        .mount("/static", FileServer::from(&config.STATIC_DIR).rank(0))
        .attach(Template::fairing())
        .manage(config)
        .manage(store))
}


/// Create the upload directory and the metadata file if they don't exist yet
async fn prepare_storage(config: &Config, store: &MetadataStore) -> Result<(), Error> {
    let upload_dir = config.upload_dir();
    check_dir(&upload_dir).await
        .or_else(|e| {
            if let Error::FileError(error, path) = &e {
                eprintln!("There is an issue with the upload directory (\"{}\") : {} : {}", path.display(), error.kind(), error);
            }
            Err(e)
        })?;
    store.init().await?;

    info!("Static directory : {}", Path::new(&config.STATIC_DIR).display());
    info!("Upload directory : {}", upload_dir.display());
    info!("Metadata file : {}", store.path().display());
    Ok(())
}


/// Check that the given directory exists, and if not, try to create it
async fn check_dir(path: &PathBuf) -> Result<(), Error> {
    match fs::metadata(path).await {

        Ok(metadata) => {
            if metadata.is_dir() {
                Ok(())
            } else {
                // The path exists but is not a directory (probably a file?), we can't create it
                Err(Error::FileError(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("\"{}\" is not a valid directory", path.display())
                ), path.clone()))
            }
        },

        Err(error) => {
            if error.kind() == io::ErrorKind::NotFound {
                info!("Creating empty directory \"{}\"", path.display());
                fs::create_dir_all(path).await.map_err(|e| Error::FileError(e, path.clone()))
            } else {
                Err(Error::FileError(error, path.clone()))
            }
        },
    }
}


/// Route handler called to render the upload and gallery page
#[get("/")]
fn index(config: &State<Config>) -> Template {
    Template::render("gallery", context! {
        title: &config.TITLE,
        unknown_location: &config.UNKNOWN_LOCATION,
        upload_url: uri!(upload_photo).to_string(),
    })
}


/// Multipart form sent to upload a photo
#[derive(FromForm)]
pub struct UploadForm<'r> {
    photo: Option<TempFile<'r>>,
    capture_time: Option<String>,
    location: Option<String>,
}


/// Tri-state responder used by the upload route
#[derive(Responder)]
pub enum UploadResult {
    Ok(Redirect),
    #[response(status = 400)]
    BadRequest(&'static str),
    #[response(status = 500)]
    Err(String),
}


/// Route handler called when a photo is uploaded
#[post("/upload", data = "<form>")]
async fn upload_photo(mut form: Form<UploadForm<'_>>, config: &State<Config>, store: &State<MetadataStore>) -> UploadResult {
    let form = &mut *form;
    let Some(photo) = form.photo.as_mut() else {
        return UploadResult::BadRequest("No file selected");
    };

    let original_name = photo.raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string())
        .unwrap_or_default();
    if original_name.is_empty() {
        return UploadResult::BadRequest("No file selected");
    }
    if !upload::allowed_file(&original_name, &config.ALLOWED_EXTENSIONS) {
        return UploadResult::BadRequest("File type not allowed");
    }

    let filename = upload::unique_filename(&upload::secure_filename(&original_name));
    match save_photo(photo, &filename, form.capture_time.as_deref(), form.location.as_deref(), config, store).await {
        Ok(()) => UploadResult::Ok(Redirect::to(uri!(index))),
        Err(error) => {
            warn!("Unable to save the upload \"{}\" : {}", original_name, error);
            UploadResult::Err(format!("Upload failed : {}", error))
        }
    }
}


/// Route handler called when an upload request doesn't carry a form at all
#[post("/upload", rank = 2)]
fn upload_without_form() -> UploadResult {
    UploadResult::BadRequest("No file selected")
}


/// Save an uploaded photo in the upload directory and append its record to the metadata file
async fn save_photo(photo: &mut TempFile<'_>, filename: &str, form_time: Option<&str>, location: Option<&str>, config: &Config, store: &MetadataStore) -> Result<(), Error> {
    let mut path = config.upload_dir();
    path.push(filename);
    photo.move_copy_to(&path).await
        .map_err(|e| Error::FileError(e, path.clone()))?;

    // Capture time priority : EXIF, then the one entered by the user, then now
    let exif_time = if config.READ_EXIF {
        let exif_path = path.clone();
        task::spawn_blocking(move || capture_time::resolve_capture_time(&exif_path)).await
            .unwrap_or_else(|error| {
                warn!("EXIF reader task failed for \"{}\" : {}", path.display(), error);
                None
            })
    } else {
        None
    };
    let time = match (exif_time, form_time.filter(|t| !t.is_empty())) {
        (Some(exif_time), _) => {
            debug!("Using the EXIF capture time of \"{}\"", filename);
            exif_time
        }
        (None, Some(user_time)) => {
            debug!("Using the capture time entered for \"{}\"", filename);
            user_time.to_string()
        }
        (None, None) => {
            debug!("Using the upload time for \"{}\"", filename);
            capture_time::now_formatted()
        }
    };
    let location = location.filter(|l| !l.is_empty()).unwrap_or(config.UNKNOWN_LOCATION.as_str());

    let timestamp = capture_time::parse_timestamp(&time)
        .map_err(|e| Error::TimeParseError(time.clone(), e))?;

    info!("New photo \"{}\" taken at {} in \"{}\"", filename, time, location);
    store.append(PhotoRecord::new(filename, &time, location, &config.upload_url(filename), timestamp)).await
}


/// Route handler called by AJAX to list the photos matching the given filters
#[get("/api/photos?<query..>")]
async fn get_photos(query: PhotoQuery, config: &State<Config>, store: &State<MetadataStore>) -> Result<Json<serde_json::Value>, (Status, String)> {
    let records = store.load().await
        .map_err(|e| (Status::InternalServerError, e.to_string()))?;
    let photos = query.apply(&records, &config.UNKNOWN_LOCATION);
    serde_json::to_value(&photos)
        .map(Json)
        .map_err(|e| (Status::InternalServerError, e.to_string()))
}
