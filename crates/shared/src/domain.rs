use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map($name)
            }
        }
    };
}

id_newtype!(DoctorId);
id_newtype!(ScheduleId);
id_newtype!(AppointmentId);

/// Calendar date format used on the wire and in form input.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_bare_integers() {
        let json = serde_json::to_string(&DoctorId(7)).expect("serialize");
        assert_eq!(json, "7");
        let parsed: ScheduleId = serde_json::from_str("2").expect("deserialize");
        assert_eq!(parsed, ScheduleId(2));
    }

    #[test]
    fn ids_parse_from_form_input() {
        assert_eq!(" 12 ".parse::<DoctorId>().expect("parse"), DoctorId(12));
        assert!("twelve".parse::<DoctorId>().is_err());
    }
}
