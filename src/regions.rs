use crate::config::Config;
use crate::db::{self, Region, RegionLevel, RegionsDb};
use log::error;
use rocket::{Build, Rocket, State};
use rocket::fairing::AdHoc;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket_db_pools::{Connection, Database};
use rocket_dyn_templates::{Template, context};


/// Response of the lookup routes : a JSON list of regions, or the database error as plain text
type RegionsResult = Result<Json<Vec<Region>>, (Status, String)>;


/// Build the region lookup service
pub fn build(config: Config) -> Rocket<Build> {
    rocket::custom(config.figment(config.REGIONS_PORT))
        .mount("/", routes![
            index,
            get_provinces,
            get_cities,
            get_areas,
        ])
        .attach(Template::fairing())
        .attach(RegionsDb::init())
        .attach(AdHoc::try_on_ignite("Region schema", db::init_schema))
        .manage(config)
}


/// Route handler called to render the region picker page
#[get("/")]
fn index(config: &State<Config>) -> Template {
    Template::render("regions", context! {
        title: &config.TITLE,
        provinces_url: uri!(get_provinces).to_string(),
        cities_url: uri!(get_cities(_)).to_string(),
        areas_url: uri!(get_areas(_)).to_string(),
    })
}


/// Route handler called by AJAX to list every province
#[get("/getProvinces")]
async fn get_provinces(mut db_conn: Connection<RegionsDb>) -> RegionsResult {
    lookup(&mut db_conn, RegionLevel::Province, None).await
}


/// Route handler called by AJAX to list the cities of a province
#[get("/getCities?<province>")]
async fn get_cities(mut db_conn: Connection<RegionsDb>, province: Option<&str>) -> RegionsResult {
    lookup(&mut db_conn, RegionLevel::City, province).await
}


/// Route handler called by AJAX to list the areas of a province
#[get("/getAreas?<province>")]
async fn get_areas(mut db_conn: Connection<RegionsDb>, province: Option<&str>) -> RegionsResult {
    lookup(&mut db_conn, RegionLevel::Area, province).await
}


async fn lookup(db_conn: &mut Connection<RegionsDb>, level: RegionLevel, province: Option<&str>) -> RegionsResult {
    db::list_regions(&mut ***db_conn, level, province).await
        .map(Json)
        .map_err(|e| {
            error!("Region lookup failed ({:?}, {:?}) : {}", level, province, e);
            (Status::InternalServerError, e.to_string())
        })
}
