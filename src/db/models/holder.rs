/// One page of `(address, balance_base)` entries from the ownership endpoint.
#[derive(Debug, Clone)]
pub struct HolderPage {
    pub entries: Vec<(String, String)>,
    pub next_key: Option<String>,
}
