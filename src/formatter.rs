//! Renders an inventory row into the channel announcement and the subscriber DM.
//!
//! Every function here is total: short rows, blank cells and junk ratings
//! degrade to the fallback strings below instead of failing.

use crate::sheet::layout::{Field, RowView};

pub const STAR: &str = "⭐";
pub const ABSENT: &str = "❌";
pub const PRESENT: &str = "✅";
pub const NOT_AVAILABLE: &str = "N/A";
pub const NON_VIP: &str = "Non VIP";

/// `n` stars for `n > 0`, otherwise the absent marker.
pub fn stars(rating: Option<u8>) -> String {
    match rating {
        Some(n) if n > 0 => STAR.repeat(n as usize),
        _ => ABSENT.to_string(),
    }
}

fn vip_label(v: &RowView<'_>) -> String {
    match v.text(Field::Vip) {
        Some(s) if !s.eq_ignore_ascii_case("NULL") => s.to_string(),
        _ => NON_VIP.to_string(),
    }
}

fn marker(present: bool) -> &'static str {
    if present {
        PRESENT
    } else {
        ABSENT
    }
}

/// Channel announcement for a newly listed car.
pub fn render_announcement(record: &[String]) -> String {
    let v = RowView::new(record);
    let or_na = |f: Field| v.text(f).unwrap_or(NOT_AVAILABLE);

    format!(
        "🚗 **Nouvelle voiture disponible !**\n\n\
         📛 **Nom** : {name}\n\
         💰 **Prix** : {price}\n\
         🎨 **Couleur** : {color}\n\
         ⭐ **VIP** : {vip}\n\n\
         🏁 **Niveaux** :\n\
         - Moteur : {engine}\n\
         - Frein : {brake}\n\
         - Transmission : {transmission}\n\
         - Suspension : {suspension}\n\
         - Turbo : {turbo}",
        name = or_na(Field::Name),
        price = or_na(Field::Price),
        color = or_na(Field::Color),
        vip = vip_label(&v),
        engine = stars(v.rating(Field::Engine)),
        brake = stars(v.rating(Field::Brake)),
        transmission = stars(v.rating(Field::Transmission)),
        suspension = stars(v.rating(Field::Suspension)),
        turbo = marker(v.flag(Field::Turbo)),
    )
}

/// Direct message for users subscribed to this car.
pub fn render_subscriber_message(record: &[String]) -> String {
    let name = RowView::new(record)
        .identity()
        .unwrap_or(NOT_AVAILABLE);
    format!(
        "🔔 Bonne nouvelle ! La voiture **{name}** est disponible !\n\n{}",
        render_announcement(record)
    )
}
