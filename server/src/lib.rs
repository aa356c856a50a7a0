// HTTP daemon for the COQL query suite:
// - Serves the query page at `/`
// - Runs the query pipeline behind `POST /query`

pub mod http_server;
pub mod page;
