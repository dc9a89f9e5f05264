//! Chapter ranges of the classification.
//!
//! Each code belongs to exactly one chapter; the chapter title becomes the
//! chunk category.

/// (chapter number, first code, last code, title)
const CHAPTERS: &[(&str, &str, &str, &str)] = &[
    ("I", "A00", "B99", "Certaines maladies infectieuses et parasitaires"),
    ("II", "C00", "D48", "Tumeurs"),
    ("III", "D50", "D89", "Maladies du sang et des organes hématopoïétiques"),
    ("IV", "E00", "E90", "Maladies endocriniennes, nutritionnelles et métaboliques"),
    ("V", "F00", "F99", "Troubles mentaux et du comportement"),
    ("VI", "G00", "G99", "Maladies du système nerveux"),
    ("VII", "H00", "H59", "Maladies de l'œil et de ses annexes"),
    ("VIII", "H60", "H95", "Maladies de l'oreille et de l'apophyse mastoïde"),
    ("IX", "I00", "I99", "Maladies de l'appareil circulatoire"),
    ("X", "J00", "J99", "Maladies de l'appareil respiratoire"),
    ("XI", "K00", "K93", "Maladies de l'appareil digestif"),
    ("XII", "L00", "L99", "Maladies de la peau et du tissu cellulaire sous-cutané"),
    (
        "XIII",
        "M00",
        "M99",
        "Maladies du système ostéo-articulaire, des muscles et du tissu conjonctif",
    ),
    ("XIV", "N00", "N99", "Maladies de l'appareil génito-urinaire"),
    ("XV", "O00", "O99", "Grossesse, accouchement et puerpéralité"),
    ("XVI", "P00", "P96", "Affections dont l'origine se situe dans la période périnatale"),
    ("XVII", "Q00", "Q99", "Malformations congénitales et anomalies chromosomiques"),
    ("XVIII", "R00", "R99", "Symptômes, signes et résultats anormaux, non classés ailleurs"),
    ("XIX", "S00", "T98", "Lésions traumatiques, empoisonnements"),
    ("XX", "V01", "Y98", "Causes externes de morbidité et de mortalité"),
    ("XXI", "Z00", "Z99", "Facteurs influant sur l'état de santé"),
    ("XXII", "U00", "U99", "Codes d'utilisation particulière"),
];

/// Orders a code by its letter and two-digit category: `R06.0` -> `R * 100 + 6`.
fn ordinal(code: &str) -> Option<u32> {
    let mut chars = code.chars();
    let letter = chars.next()?;
    if !letter.is_ascii_uppercase() {
        return None;
    }
    let digits: u32 = code.get(1..3)?.parse().ok()?;
    Some(letter as u32 * 100 + digits)
}

/// Returns `(chapter number, chapter title)` for a code, or empty strings when
/// the code falls outside every chapter range.
pub fn chapter_for_code(code: &str) -> (&'static str, &'static str) {
    let Some(value) = ordinal(code) else {
        return ("", "");
    };

    CHAPTERS
        .iter()
        .find(|(_, first, last, _)| {
            matches!((ordinal(first), ordinal(last)), (Some(lo), Some(hi)) if (lo..=hi).contains(&value))
        })
        .map(|(number, _, _, title)| (*number, *title))
        .unwrap_or(("", ""))
}
