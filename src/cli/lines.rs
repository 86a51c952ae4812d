use crate::budget::set_engaged;
use crate::error::Result;
use crate::fmt::amount;
use super::open_db;

pub fn engage(id: i64, engaged: f64) -> Result<()> {
    let conn = open_db()?;
    set_engaged(&conn, id, engaged)?;
    println!("Budget line {id}: engaged set to {}", amount(engaged));
    Ok(())
}
