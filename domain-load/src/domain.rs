//! Random domain names, freshly generated for every call.
use rand::{seq::SliceRandom, Rng};

const SUFFIXES: &[&str] = &["com", "biz", "info", "name", "net", "org"];

const WORDS: &[&str] = &[
    "abbott", "adams", "bailey", "barton", "bauch", "bechtelar", "bernier", "boyle", "brakus",
    "carroll", "cassin", "collins", "conroy", "cronin", "dach", "daniel", "dicki", "dooley",
    "emard", "feeney", "fisher", "gleason", "goodwin", "grady", "hackett", "hane", "hermann",
    "hills", "jacobs", "jast", "kautzer", "kemmer", "kiehn", "koch", "kub", "kunze", "lakin",
    "larson", "lebsack", "lind", "lowe", "marvin", "mayer", "mills", "morar", "nader", "nolan",
    "okuneva", "ortiz", "pagac", "parker", "pouros", "quigley", "ratke", "reilly", "ritchie",
    "runte", "sauer", "schaden", "schmitt", "schuster", "smith", "stark", "stokes", "terry",
    "thiel", "towne", "trantow", "turner", "upton", "vandervort", "veum", "walker", "wehner",
    "weimann", "wiza", "wolf", "yost", "zboncak", "zemlak",
];

/// A fully qualified domain name such as `kub-ortiz.biz` or `schmitt.net`.
pub fn random_domain<R: Rng + ?Sized>(rng: &mut R) -> String {
    let first = pick(rng, WORDS);
    let suffix = pick(rng, SUFFIXES);

    if rng.gen_bool(0.5) {
        format!("{first}-{}.{suffix}", pick(rng, WORDS))
    } else {
        format!("{first}.{suffix}")
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, from: &[&'static str]) -> &'static str {
    from.choose(rng).copied().unwrap_or("example")
}
