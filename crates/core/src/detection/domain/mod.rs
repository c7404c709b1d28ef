pub mod face;
pub mod face_landmarks;
