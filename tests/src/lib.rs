//! Nothing lives here; the scenarios in `tests/` drive `vizstack-core`
//! through `Broker`/`Dispatcher` the way a deployed broker would.
